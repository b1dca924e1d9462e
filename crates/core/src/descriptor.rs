use serde::{Deserialize, Serialize};

use crate::context::ThresholdMap;

/// Inputs to the applicability predicate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Applicability {
    /// Diagnosis context the rule targets, e.g. "T2DM/General".
    /// Empty means the rule applies to everyone.
    pub diagnosis_context: Option<String>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
}

/// Static metadata attached to a rule when it is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    /// Minimum number of daily summaries the rule needs.
    pub min_window_days: usize,
    pub default_thresholds: ThresholdMap,
    pub applicability: Applicability,
    pub tags: Vec<String>,
}

impl RuleDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            description: name.clone(),
            name,
            version: "1.0.0".to_string(),
            min_window_days: 1,
            default_thresholds: ThresholdMap::new(),
            applicability: Applicability::default(),
            tags: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn min_window_days(mut self, days: usize) -> Self {
        self.min_window_days = days;
        self
    }

    pub fn default_threshold(mut self, name: impl Into<String>, value: f64) -> Self {
        self.default_thresholds.insert(name.into(), value);
        self
    }

    pub fn diagnosis_context(mut self, context: impl Into<String>) -> Self {
        self.applicability.diagnosis_context = Some(context.into());
        self
    }

    pub fn age_range(mut self, min_age: Option<u32>, max_age: Option<u32>) -> Self {
        self.applicability.min_age = min_age;
        self.applicability.max_age = max_age;
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn default_for(&self, name: &str) -> Option<f64> {
        self.default_thresholds.get(name).copied()
    }
}
