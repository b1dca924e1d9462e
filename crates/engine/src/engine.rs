//! Per-patient sliding-window evaluation.
//!
//! Each analysis date goes through FETCH, SUMMARIZE, BUILD_CONTEXT,
//! EVALUATE and EMIT. Dates are processed strictly in chronological order
//! because the summary cache and the day buffer only ever move forward.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{NaiveDate, TimeDelta};
use cgm_core::{
    CgmDay, PatternDetection, PatternInputBundle, PatternSettings, Result,
};
use cgm_rules::{RuleFailure, RuleFilter, RuleRegistry, SkippedRule};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::DailySummaryCache;
use crate::features::{StandardSummaries, SummaryDeriver};
use crate::source::DailyCgmSource;

/// Everything produced for one analysis date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateDetections {
    pub date: NaiveDate,
    pub detections: Vec<PatternDetection>,
    pub skipped: Vec<SkippedRule>,
    pub failures: Vec<RuleFailure>,
}

impl DateDetections {
    pub fn triggered(&self) -> impl Iterator<Item = &PatternDetection> {
        self.detections.iter().filter(|d| d.is_triggered())
    }
}

/// Drives rule evaluation across a date range for one patient at a time.
///
/// The engine itself is immutable and cheap to share; all per-patient
/// state lives in the [`PatientRun`] returned by [`run`](Self::run).
#[derive(Clone)]
pub struct SlidingWindowEngine {
    source: Arc<dyn DailyCgmSource>,
    registry: Arc<RuleRegistry>,
    settings: Arc<PatternSettings>,
    deriver: Arc<dyn SummaryDeriver>,
    lookback_days: usize,
}

impl SlidingWindowEngine {
    /// `lookback_days` counts the analysis date itself; values below 1
    /// are treated as 1.
    pub fn new(
        source: Arc<dyn DailyCgmSource>,
        registry: Arc<RuleRegistry>,
        settings: Arc<PatternSettings>,
        lookback_days: usize,
    ) -> Self {
        Self {
            source,
            registry,
            settings,
            deriver: Arc::new(StandardSummaries::default()),
            lookback_days: lookback_days.max(1),
        }
    }

    pub fn with_deriver(mut self, deriver: Arc<dyn SummaryDeriver>) -> Self {
        self.deriver = deriver;
        self
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn lookback_days(&self) -> usize {
        self.lookback_days
    }

    /// Lazily evaluate every date in `start..=end` for `patient_id`.
    ///
    /// Each item is one analysis date, in order. A data source failure is
    /// yielded once as an error and ends the run. An empty range yields
    /// nothing. Restart by calling `run` again.
    pub fn run(
        &self,
        patient_id: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
        filter: Option<RuleFilter>,
    ) -> PatientRun {
        let patient_id = patient_id.into();
        info!(patient_id = %patient_id, %start, %end, "starting patient run");
        PatientRun {
            engine: self.clone(),
            patient_id,
            filter,
            next_date: (start <= end).then_some(start),
            end,
            days: VecDeque::new(),
            fetched_through: None,
            cache: DailySummaryCache::new(),
        }
    }
}

/// Iterator over one patient's analysis dates.
pub struct PatientRun {
    engine: SlidingWindowEngine,
    patient_id: String,
    filter: Option<RuleFilter>,
    next_date: Option<NaiveDate>,
    end: NaiveDate,
    /// Fetched days still inside the current window, oldest first.
    days: VecDeque<Arc<CgmDay>>,
    fetched_through: Option<NaiveDate>,
    cache: DailySummaryCache,
}

impl PatientRun {
    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn cache(&self) -> &DailySummaryCache {
        &self.cache
    }

    fn window_start(&self, date: NaiveDate) -> NaiveDate {
        // lookbacks past the calendar range clamp to its first day
        i64::try_from(self.engine.lookback_days - 1)
            .ok()
            .and_then(TimeDelta::try_days)
            .and_then(|back| date.checked_sub_signed(back))
            .unwrap_or(NaiveDate::MIN)
    }

    /// FETCH: request only the days not already buffered.
    fn fetch(&mut self, window_start: NaiveDate, date: NaiveDate) -> Result<()> {
        let from = match self.fetched_through.and_then(|d| d.succ_opt()) {
            Some(next) if next > window_start => next,
            _ => window_start,
        };
        self.fetched_through = Some(date);
        // drop days that slid out of the window
        while self.days.front().is_some_and(|d| d.date < window_start) {
            self.days.pop_front();
        }
        if from > date {
            return Ok(());
        }

        let fetched = self.engine.source.get_days(&self.patient_id, from, date)?;
        let mut last = self.days.back().map(|d| d.date);
        for day in fetched {
            if day.date < from || day.date > date {
                warn!(
                    patient_id = %self.patient_id,
                    day = %day.date,
                    %from,
                    to = %date,
                    "source returned a day outside the requested range"
                );
                continue;
            }
            if last.is_some_and(|l| day.date <= l) {
                warn!(patient_id = %self.patient_id, day = %day.date, "source returned a day out of order");
                continue;
            }
            last = Some(day.date);
            self.days.push_back(Arc::new(day));
        }
        Ok(())
    }

    fn evaluate_date(&mut self, date: NaiveDate) -> Result<DateDetections> {
        let window_start = self.window_start(date);
        self.fetch(window_start, date)?;

        // SUMMARIZE
        let deriver = Arc::clone(&self.engine.deriver);
        let summaries: Vec<_> = self
            .days
            .iter()
            .map(|day| self.cache.get_or_derive(&self.patient_id, day, deriver.as_ref()))
            .collect();

        // BUILD_CONTEXT
        let readings = self.days.iter().flat_map(|d| d.readings.iter().copied());
        let bundle = PatternInputBundle::new(
            self.patient_id.as_str(),
            window_start,
            date,
            readings,
            summaries,
        );
        let context = self.engine.settings.context_for(&self.patient_id, date);

        // EVALUATE
        let batch = self
            .engine
            .registry
            .detect_all(&bundle, &context, self.filter.as_ref());
        debug!(
            patient_id = %self.patient_id,
            %date,
            summaries = bundle.summary_count(),
            detections = batch.detections.len(),
            skipped = batch.skipped.len(),
            failures = batch.failures.len(),
            "evaluated date"
        );

        Ok(DateDetections {
            date,
            detections: batch.detections,
            skipped: batch.skipped,
            failures: batch.failures,
        })
    }
}

impl Drop for PatientRun {
    fn drop(&mut self) {
        self.engine.source.release(&self.patient_id);
    }
}

impl Iterator for PatientRun {
    type Item = Result<DateDetections>;

    fn next(&mut self) -> Option<Self::Item> {
        let date = self.next_date.filter(|d| *d <= self.end)?;
        self.next_date = date.succ_opt();

        match self.evaluate_date(date) {
            Ok(detections) => Some(Ok(detections)),
            Err(e) => {
                warn!(patient_id = %self.patient_id, %date, error = %e, "patient run aborted");
                self.next_date = None;
                Some(Err(e))
            }
        }
    }
}
