use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Named numeric thresholds. Ordered so serialized output is stable.
pub type ThresholdMap = BTreeMap<String, f64>;

/// Patient attributes consulted by applicability checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientMetadata {
    pub age: Option<u32>,
    /// e.g. "T1DM", "T2DM".
    pub diabetes_type: Option<String>,
    /// Free-form diagnosis context labels.
    pub diagnoses: Vec<String>,
}

/// Per-evaluation configuration handed to every rule.
///
/// Built fresh for each (patient, analysis date). Rules only read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternContext {
    pub patient_id: String,
    pub analysis_date: NaiveDate,
    /// Overrides that apply to every rule.
    #[serde(default)]
    pub thresholds: ThresholdMap,
    /// Overrides keyed by rule id; these win over `thresholds`.
    #[serde(default)]
    pub rule_thresholds: BTreeMap<String, ThresholdMap>,
    #[serde(default)]
    pub patient: PatientMetadata,
}

impl PatternContext {
    pub fn new(patient_id: impl Into<String>, analysis_date: NaiveDate) -> Self {
        Self {
            patient_id: patient_id.into(),
            analysis_date,
            thresholds: ThresholdMap::new(),
            rule_thresholds: BTreeMap::new(),
            patient: PatientMetadata::default(),
        }
    }

    pub fn with_threshold(mut self, name: impl Into<String>, value: f64) -> Self {
        self.thresholds.insert(name.into(), value);
        self
    }

    pub fn with_rule_threshold(
        mut self,
        rule_id: impl Into<String>,
        name: impl Into<String>,
        value: f64,
    ) -> Self {
        self.rule_thresholds
            .entry(rule_id.into())
            .or_default()
            .insert(name.into(), value);
        self
    }

    pub fn with_patient(mut self, patient: PatientMetadata) -> Self {
        self.patient = patient;
        self
    }

    pub fn rule_override(&self, rule_id: &str, name: &str) -> Option<f64> {
        self.rule_thresholds
            .get(rule_id)
            .and_then(|m| m.get(name))
            .copied()
    }

    pub fn global_override(&self, name: &str) -> Option<f64> {
        self.thresholds.get(name).copied()
    }

    /// Rule-specific override, falling back to the global override.
    pub fn threshold(&self, rule_id: &str, name: &str) -> Option<f64> {
        self.rule_override(rule_id, name)
            .or_else(|| self.global_override(name))
    }
}
