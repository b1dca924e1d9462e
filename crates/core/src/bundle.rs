use std::sync::Arc;

use chrono::NaiveDate;

use crate::reading::Reading;
use crate::summary::DailySummary;

/// The window of data visible to rules for one analysis date.
///
/// Covers the inclusive date range `window_start..=analysis_date`. The
/// constructor drops anything outside that range and orders both
/// sequences chronologically, so a bundle never exposes out-of-window data.
#[derive(Debug, Clone)]
pub struct PatternInputBundle {
    patient_id: String,
    window_start: NaiveDate,
    analysis_date: NaiveDate,
    readings: Vec<Reading>,
    summaries: Vec<Arc<DailySummary>>,
}

impl PatternInputBundle {
    pub fn new(
        patient_id: impl Into<String>,
        window_start: NaiveDate,
        analysis_date: NaiveDate,
        readings: impl IntoIterator<Item = Reading>,
        summaries: impl IntoIterator<Item = Arc<DailySummary>>,
    ) -> Self {
        let in_window = |d: NaiveDate| d >= window_start && d <= analysis_date;

        let mut readings: Vec<Reading> = readings
            .into_iter()
            .filter(|r| in_window(r.date()))
            .collect();
        readings.sort_by_key(|r| r.timestamp);

        let mut summaries: Vec<Arc<DailySummary>> = summaries
            .into_iter()
            .filter(|s| in_window(s.date))
            .collect();
        summaries.sort_by_key(|s| s.date);
        summaries.dedup_by_key(|s| s.date);

        Self {
            patient_id: patient_id.into(),
            window_start,
            analysis_date,
            readings,
            summaries,
        }
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn window_start(&self) -> NaiveDate {
        self.window_start
    }

    pub fn analysis_date(&self) -> NaiveDate {
        self.analysis_date
    }

    /// All readings in the window, oldest first.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Daily summaries in the window, oldest first, at most one per date.
    pub fn summaries(&self) -> &[Arc<DailySummary>] {
        &self.summaries
    }

    pub fn summary_count(&self) -> usize {
        self.summaries.len()
    }

    /// The `n` most recent summaries (fewer if the window is shorter).
    pub fn recent_summaries(&self, n: usize) -> &[Arc<DailySummary>] {
        let start = self.summaries.len().saturating_sub(n);
        &self.summaries[start..]
    }

    /// Readings that fall on `date`.
    pub fn readings_on(&self, date: NaiveDate) -> &[Reading] {
        let lo = self.readings.partition_point(|r| r.date() < date);
        let hi = self.readings.partition_point(|r| r.date() <= date);
        &self.readings[lo..hi]
    }

    /// Dates in the window that have at least one summary.
    pub fn summary_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.summaries.iter().map(|s| s.date)
    }
}
