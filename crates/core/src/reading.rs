use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Readings expected in a fully covered day at the standard 5-minute cadence.
pub const DEFAULT_READINGS_PER_DAY: usize = 288;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// A single CGM sample. Timestamps are local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub glucose_mg_dl: f64,
}

impl Reading {
    pub fn new(timestamp: NaiveDateTime, glucose_mg_dl: f64) -> Self {
        Self {
            timestamp,
            glucose_mg_dl,
        }
    }

    /// Calendar day the reading belongs to.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// One calendar day of readings as delivered by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CgmDay {
    pub date: NaiveDate,
    pub readings: Vec<Reading>,
}

impl CgmDay {
    /// Build a day, sorting readings chronologically and dropping any
    /// sample whose timestamp falls on a different date.
    pub fn new(date: NaiveDate, mut readings: Vec<Reading>) -> Self {
        readings.retain(|r| r.date() == date);
        readings.sort_by_key(|r| r.timestamp);
        Self { date, readings }
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Fraction of the day covered by readings, capped at 1.0.
    ///
    /// The expected reading count is inferred from the median interval
    /// between consecutive samples, falling back to 288 per day when the
    /// cadence cannot be determined.
    pub fn coverage_ratio(&self) -> f64 {
        if self.readings.is_empty() {
            return 0.0;
        }
        let expected = self
            .median_interval_seconds()
            .filter(|s| *s > 0.0)
            .map(|s| ((SECONDS_PER_DAY / s).round() as usize).max(1))
            .unwrap_or(DEFAULT_READINGS_PER_DAY);
        (self.readings.len() as f64 / expected as f64).min(1.0)
    }

    fn median_interval_seconds(&self) -> Option<f64> {
        let mut diffs: Vec<f64> = self
            .readings
            .windows(2)
            .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds() as f64)
            .collect();
        if diffs.is_empty() {
            return None;
        }
        diffs.sort_by(|a, b| a.total_cmp(b));
        let mid = diffs.len() / 2;
        let median = if diffs.len() % 2 == 0 {
            (diffs[mid - 1] + diffs[mid]) / 2.0
        } else {
            diffs[mid]
        };
        Some(median)
    }
}
