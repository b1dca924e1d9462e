//! Multi-patient runs over a bounded worker pool.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use cgm_core::PatternDetection;
use cgm_rules::RuleFilter;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{DateDetections, SlidingWindowEngine};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    Completed,
    /// The data source failed; `dates` holds whatever finished before it.
    Failed,
    /// Never started because the run was cancelled.
    Cancelled,
}

/// One patient's results, in analysis-date order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientOutcome {
    pub status: PatientStatus,
    pub dates: Vec<DateDetections>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PatientOutcome {
    fn cancelled() -> Self {
        Self {
            status: PatientStatus::Cancelled,
            dates: Vec::new(),
            error: None,
        }
    }

    /// Triggered detections grouped by date and by rule.
    pub fn triggered_summary(&self) -> TriggeredSummary {
        let mut summary = TriggeredSummary::default();
        for day in &self.dates {
            let triggered: Vec<PatternDetection> = day.triggered().cloned().collect();
            if triggered.is_empty() {
                continue;
            }
            for detection in &triggered {
                summary
                    .by_rule
                    .entry(detection.rule_id.clone())
                    .or_default()
                    .push(day.date);
            }
            summary.by_date.insert(day.date, triggered);
        }
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TriggeredSummary {
    pub by_date: BTreeMap<NaiveDate, Vec<PatternDetection>>,
    pub by_rule: BTreeMap<String, Vec<NaiveDate>>,
}

impl TriggeredSummary {
    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}

/// Results for every patient of a batch, keyed by patient id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub patients: BTreeMap<String, PatientOutcome>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn failed_patients(&self) -> impl Iterator<Item = (&str, &PatientOutcome)> {
        self.patients
            .iter()
            .filter(|(_, o)| o.status == PatientStatus::Failed)
            .map(|(id, o)| (id.as_str(), o))
    }

    /// Every rule failure as `(patient_id, date, rule_id, message)`.
    pub fn rule_failures(&self) -> impl Iterator<Item = (&str, NaiveDate, &str, &str)> {
        self.patients.iter().flat_map(|(patient, outcome)| {
            outcome.dates.iter().flat_map(move |day| {
                day.failures
                    .iter()
                    .map(move |f| (patient.as_str(), day.date, f.rule_id.as_str(), f.message.as_str()))
            })
        })
    }

    pub fn triggered_count(&self) -> usize {
        self.patients
            .values()
            .flat_map(|o| &o.dates)
            .map(|d| d.triggered().count())
            .sum()
    }
}

/// Evaluates many patients in parallel, one worker per patient at a time.
///
/// Each patient's dates run sequentially on a single worker. Cancellation
/// is checked before a patient starts; a patient already in progress runs
/// to completion.
pub struct BatchRunner {
    engine: Arc<SlidingWindowEngine>,
    workers: usize,
    cancel: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(engine: SlidingWindowEngine, workers: usize) -> Self {
        Self {
            engine: Arc::new(engine),
            workers: workers.max(1),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an existing flag, e.g. one raised by a signal handler.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that stops the batch between patients once set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run(
        &self,
        patients: &[String],
        start: NaiveDate,
        end: NaiveDate,
        filter: Option<&RuleFilter>,
    ) -> Result<BatchReport> {
        let started = Instant::now();
        let mut seen = BTreeSet::new();
        let patients: Vec<&String> = patients
            .iter()
            .filter(|id| {
                let first = seen.insert(id.as_str());
                if !first {
                    warn!(patient_id = %id, "duplicate patient id, running it once");
                }
                first
            })
            .collect();
        info!(
            patients = patients.len(),
            workers = self.workers,
            %start,
            %end,
            "starting batch"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| EngineError::WorkerPool(e.to_string()))?;

        let outcomes: Vec<(String, PatientOutcome)> = pool.install(|| {
            patients
                .par_iter()
                .map(|patient_id| {
                    let outcome = self.run_patient(patient_id, start, end, filter);
                    (patient_id.to_string(), outcome)
                })
                .collect()
        });

        let report = BatchReport {
            patients: outcomes.into_iter().collect(),
            cancelled: self.cancel.load(Ordering::Relaxed),
        };
        info!(
            patients = report.patients.len(),
            failed = report.failed_patients().count(),
            triggered = report.triggered_count(),
            cancelled = report.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch complete"
        );
        Ok(report)
    }

    fn run_patient(
        &self,
        patient_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        filter: Option<&RuleFilter>,
    ) -> PatientOutcome {
        if self.cancel.load(Ordering::Relaxed) {
            info!(patient_id, "skipping patient, batch cancelled");
            return PatientOutcome::cancelled();
        }

        let mut dates = Vec::new();
        for item in self.engine.run(patient_id, start, end, filter.cloned()) {
            match item {
                Ok(day) => dates.push(day),
                Err(e) => {
                    warn!(patient_id, error = %e, "patient failed");
                    return PatientOutcome {
                        status: PatientStatus::Failed,
                        dates,
                        error: Some(e.to_string()),
                    };
                }
            }
        }
        info!(patient_id, dates = dates.len(), "patient complete");
        PatientOutcome {
            status: PatientStatus::Completed,
            dates,
            error: None,
        }
    }
}
