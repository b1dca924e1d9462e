#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use cgm_core::{CgmDay, DailySummary, Reading};
use cgm_engine::{StandardSummaries, SummaryDeriver};

pub fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

/// 288 readings at 5-minute spacing alternating between `low` and `high`.
pub fn alternating_day(day: NaiveDate, low: f64, high: f64) -> Vec<Reading> {
    let midnight = day.and_hms_opt(0, 0, 0).unwrap();
    (0..288)
        .map(|i| {
            let value = if i % 2 == 0 { low } else { high };
            Reading::new(midnight + Duration::minutes(5 * i), value)
        })
        .collect()
}

/// Days 1..=n where each day has mean 100 mg/dL and std 42 mg/dL (CV 0.42).
pub fn variable_patient(n: u32) -> Vec<Reading> {
    (1..=n).flat_map(|d| alternating_day(date(d), 58.0, 142.0)).collect()
}

/// Wraps the standard deriver and counts derivations.
#[derive(Default)]
pub struct CountingDeriver {
    inner: StandardSummaries,
    pub calls: Arc<AtomicUsize>,
}

impl CountingDeriver {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SummaryDeriver for CountingDeriver {
    fn derive(&self, patient_id: &str, day: &CgmDay) -> DailySummary {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.derive(patient_id, day)
    }
}
