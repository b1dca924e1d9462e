use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Outcome of one rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternStatus {
    #[serde(rename = "detected")]
    Triggered,
    #[serde(rename = "not_detected")]
    NotTriggered,
    #[serde(rename = "insufficient_data")]
    InsufficientData,
}

impl fmt::Display for PatternStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternStatus::Triggered => write!(f, "detected"),
            PatternStatus::NotTriggered => write!(f, "not_detected"),
            PatternStatus::InsufficientData => write!(f, "insufficient_data"),
        }
    }
}

/// Standardized output of one rule for one analysis date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDetection {
    pub rule_id: String,
    pub analysis_date: NaiveDate,
    pub status: PatternStatus,
    pub metrics: BTreeMap<String, f64>,
    /// Human-readable evidence lines.
    pub evidence: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub version: String,
}

impl PatternDetection {
    pub fn new(
        rule_id: impl Into<String>,
        analysis_date: NaiveDate,
        status: PatternStatus,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            analysis_date,
            status,
            metrics: BTreeMap::new(),
            evidence: Vec::new(),
            confidence: None,
            version: String::new(),
        }
    }

    pub fn metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn evidence(mut self, line: impl Into<String>) -> Self {
        self.evidence.push(line.into());
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn is_triggered(&self) -> bool {
        self.status == PatternStatus::Triggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_with_legacy_names() {
        let json = serde_json::to_string(&PatternStatus::Triggered).unwrap();
        assert_eq!(json, "\"detected\"");
        let status: PatternStatus = serde_json::from_str("\"insufficient_data\"").unwrap();
        assert_eq!(status, PatternStatus::InsufficientData);
    }

    #[test]
    fn confidence_is_clamped() {
        let d = PatternDetection::new("r", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), PatternStatus::Triggered)
            .confidence(1.7);
        assert_eq!(d.confidence, Some(1.0));
    }
}
