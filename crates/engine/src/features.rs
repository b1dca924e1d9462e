//! Daily summary derivation.

use cgm_core::config::SummaryConfig;
use cgm_core::{CgmDay, DailySummary};

/// Turns one calendar day of readings into a [`DailySummary`].
///
/// The engine calls this at most once per (patient, date) within a run.
pub trait SummaryDeriver: Send + Sync {
    fn derive(&self, patient_id: &str, day: &CgmDay) -> DailySummary;
}

/// The standard feature step: moments, extremes, and time above, below
/// and within range.
#[derive(Debug, Clone, Default)]
pub struct StandardSummaries {
    config: SummaryConfig,
}

impl StandardSummaries {
    pub fn new(config: SummaryConfig) -> Self {
        Self { config }
    }
}

impl SummaryDeriver for StandardSummaries {
    fn derive(&self, patient_id: &str, day: &CgmDay) -> DailySummary {
        compute_daily_summary(patient_id, day, &self.config)
    }
}

/// Aggregate a day's readings.
///
/// Each reading is credited `reading_interval_minutes`; the `percent_*`
/// fields are fractions of the credited minutes (0..=1). High is strictly
/// above `high_threshold`, low strictly below `low_threshold`.
pub fn compute_daily_summary(patient_id: &str, day: &CgmDay, config: &SummaryConfig) -> DailySummary {
    if day.is_empty() {
        return DailySummary::empty(patient_id, day.date);
    }

    let values: Vec<f64> = day.readings.iter().map(|r| r.glucose_mg_dl).collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let step = config.reading_interval_minutes;
    let total_minutes = n * step;
    let high = values.iter().filter(|v| **v > config.high_threshold).count() as f64;
    let low = values.iter().filter(|v| **v < config.low_threshold).count() as f64;
    let minutes_high = high * step;
    let minutes_low = low * step;
    let minutes_in_range = total_minutes - (minutes_high + minutes_low);
    let fraction = |minutes: f64| {
        if total_minutes > 0.0 {
            minutes / total_minutes
        } else {
            0.0
        }
    };

    DailySummary {
        patient_id: patient_id.to_string(),
        date: day.date,
        mean_glucose: Some(mean),
        std_glucose: Some(variance.sqrt()),
        min_glucose: Some(min),
        max_glucose: Some(max),
        percent_high: fraction(minutes_high),
        percent_low: fraction(minutes_low),
        percent_in_range: fraction(minutes_in_range),
        time_high_minutes: minutes_high,
        time_low_minutes: minutes_low,
        time_in_range_minutes: minutes_in_range,
        total_readings: values.len(),
        coverage_ratio: day.coverage_ratio(),
    }
}
