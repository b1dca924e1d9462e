//! Result types returned by [`RuleRegistry::detect_all`](super::RuleRegistry::detect_all).

use cgm_core::{PatternDetection, PatternError};
use serde::Serialize;

/// Why a rule produced no detection without failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The applicability predicate excluded the rule; it was not invoked.
    NotApplicable,
    /// The window held fewer daily summaries than the rule requires.
    InsufficientData { available: usize, required: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRule {
    pub rule_id: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// A rule that failed unexpectedly during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleFailure {
    pub rule_id: String,
    pub message: String,
    /// The typed error when the rule returned one; `None` for panics.
    #[serde(skip)]
    pub cause: Option<PatternError>,
}

impl RuleFailure {
    /// The failure as a `RuleExecution` error.
    pub fn to_error(&self) -> PatternError {
        PatternError::RuleExecution {
            rule_id: self.rule_id.clone(),
            message: self.message.clone(),
        }
    }
}

/// Everything one `detect_all` call produced, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionBatch {
    pub detections: Vec<PatternDetection>,
    pub skipped: Vec<SkippedRule>,
    pub failures: Vec<RuleFailure>,
}

impl DetectionBatch {
    pub fn triggered(&self) -> impl Iterator<Item = &PatternDetection> {
        self.detections.iter().filter(|d| d.is_triggered())
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failed_rule_ids(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.rule_id.as_str())
    }
}
