use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Aggregate statistics for one calendar day of readings.
///
/// Derived once per (patient, date) by the engine and shared read-only
/// across every window that contains the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub patient_id: String,
    pub date: NaiveDate,
    /// `None` when the day has no readings.
    pub mean_glucose: Option<f64>,
    /// Population standard deviation.
    pub std_glucose: Option<f64>,
    pub min_glucose: Option<f64>,
    pub max_glucose: Option<f64>,
    pub percent_high: f64,
    pub percent_low: f64,
    pub percent_in_range: f64,
    pub time_high_minutes: f64,
    pub time_low_minutes: f64,
    pub time_in_range_minutes: f64,
    pub total_readings: usize,
    pub coverage_ratio: f64,
}

impl DailySummary {
    /// Summary for a day with no readings.
    pub fn empty(patient_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            patient_id: patient_id.into(),
            date,
            mean_glucose: None,
            std_glucose: None,
            min_glucose: None,
            max_glucose: None,
            percent_high: 0.0,
            percent_low: 0.0,
            percent_in_range: 0.0,
            time_high_minutes: 0.0,
            time_low_minutes: 0.0,
            time_in_range_minutes: 0.0,
            total_readings: 0,
            coverage_ratio: 0.0,
        }
    }

    /// Coefficient of variation (std / mean) for the day.
    pub fn coefficient_of_variation(&self) -> Option<f64> {
        match (self.mean_glucose, self.std_glucose) {
            (Some(mean), Some(std)) if mean > 0.0 => Some(std / mean),
            _ => None,
        }
    }

    pub fn has_readings(&self) -> bool {
        self.total_readings > 0
    }
}
