use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use cgm_core::{CgmDay, DailySummary};
use tracing::debug;

use crate::features::SummaryDeriver;

/// Per-patient summary cache, scoped to one engine run.
///
/// Entries are never evicted or replaced, so a summary is derived at most
/// once per date for the lifetime of the cache.
#[derive(Debug, Default)]
pub struct DailySummaryCache {
    entries: BTreeMap<NaiveDate, Arc<DailySummary>>,
    hits: usize,
    misses: usize,
}

impl DailySummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached summary for `day.date`, deriving it on first use.
    pub fn get_or_derive(
        &mut self,
        patient_id: &str,
        day: &CgmDay,
        deriver: &dyn SummaryDeriver,
    ) -> Arc<DailySummary> {
        if let Some(summary) = self.entries.get(&day.date) {
            self.hits += 1;
            debug!(patient_id, date = %day.date, "summary cache hit");
            return Arc::clone(summary);
        }
        self.misses += 1;
        let summary = Arc::new(deriver.derive(patient_id, day));
        self.entries.insert(day.date, Arc::clone(&summary));
        summary
    }

    pub fn get(&self, date: NaiveDate) -> Option<&Arc<DailySummary>> {
        self.entries.get(&date)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Number of derivations performed.
    pub fn misses(&self) -> usize {
        self.misses
    }
}
