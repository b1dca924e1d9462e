//! JSON report written by the binary.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use cgm_core::PatternDetection;
use cgm_engine::{BatchReport, PatientOutcome, PatientStatus};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PatientReport<'a> {
    pub status: PatientStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    /// Detections per analysis date; triggered only unless `include_all`.
    pub detections: BTreeMap<NaiveDate, Vec<&'a PatternDetection>>,
    /// Triggered dates per rule.
    pub summary: Vec<PatternDates>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureEntry<'a>>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct PatternDates {
    pub pattern_id: String,
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct FailureEntry<'a> {
    pub date: NaiveDate,
    pub rule_id: &'a str,
    pub message: &'a str,
}

impl<'a> PatientReport<'a> {
    pub fn from_outcome(outcome: &'a PatientOutcome, include_all: bool) -> Self {
        let mut detections = BTreeMap::new();
        let mut failures = Vec::new();
        for day in &outcome.dates {
            let kept: Vec<&PatternDetection> = day
                .detections
                .iter()
                .filter(|d| include_all || d.is_triggered())
                .collect();
            if !kept.is_empty() {
                detections.insert(day.date, kept);
            }
            failures.extend(day.failures.iter().map(|f| FailureEntry {
                date: day.date,
                rule_id: f.rule_id.as_str(),
                message: f.message.as_str(),
            }));
        }

        let summary = outcome
            .triggered_summary()
            .by_rule
            .into_iter()
            .map(|(pattern_id, dates)| PatternDates { pattern_id, dates })
            .collect();

        Self {
            status: outcome.status,
            error: outcome.error.as_deref(),
            detections,
            summary,
            failures,
        }
    }
}

/// One entry per patient, keyed and ordered by patient id.
pub fn render(batch: &BatchReport, include_all: bool) -> BTreeMap<&str, PatientReport<'_>> {
    batch
        .patients
        .iter()
        .map(|(id, outcome)| (id.as_str(), PatientReport::from_outcome(outcome, include_all)))
        .collect()
}
