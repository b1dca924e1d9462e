//! Patient-level pattern settings loaded from YAML.
//!
//! ```yaml
//! thresholds:
//!   minimum_day_coverage: 0.7
//! rules:
//!   high_glycemic_variability:
//!     cv_threshold: 0.36
//! patients:
//!   patient-42:
//!     metadata:
//!       age: 67
//!       diabetes_type: T2DM
//!     rules:
//!       high_glycemic_variability:
//!         cv_threshold: 0.33
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::{PatientMetadata, PatternContext, ThresholdMap};
use crate::error::{PatternError, Result};

/// Overrides and metadata for a single patient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientSettings {
    pub metadata: PatientMetadata,
    pub thresholds: ThresholdMap,
    pub rules: BTreeMap<String, ThresholdMap>,
}

/// Global threshold overrides plus per-patient layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSettings {
    pub thresholds: ThresholdMap,
    pub rules: BTreeMap<String, ThresholdMap>,
    pub patients: BTreeMap<String, PatientSettings>,
}

impl PatternSettings {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| PatternError::Settings(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| PatternError::Settings(format!("{}: {}", path.display(), e)))?;
        let settings = Self::from_yaml(&contents)?;
        debug!(
            path = %path.display(),
            patients = settings.patients.len(),
            "loaded pattern settings"
        );
        Ok(settings)
    }

    /// Build the evaluation context for one patient and analysis date.
    ///
    /// Patient-level values are layered over the global ones key by key.
    pub fn context_for(&self, patient_id: &str, analysis_date: NaiveDate) -> PatternContext {
        let mut ctx = PatternContext::new(patient_id, analysis_date);
        ctx.thresholds = self.thresholds.clone();
        ctx.rule_thresholds = self.rules.clone();

        if let Some(patient) = self.patients.get(patient_id) {
            ctx.thresholds
                .extend(patient.thresholds.iter().map(|(k, v)| (k.clone(), *v)));
            for (rule_id, overrides) in &patient.rules {
                ctx.rule_thresholds
                    .entry(rule_id.clone())
                    .or_default()
                    .extend(overrides.iter().map(|(k, v)| (k.clone(), *v)));
            }
            ctx.patient = patient.metadata.clone();
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
thresholds:
  minimum_day_coverage: 0.7
  cv_threshold: 0.36
rules:
  high_glycemic_variability:
    cv_threshold: 0.38
    analysis_window_days: 7
patients:
  p-42:
    metadata:
      age: 67
      diabetes_type: T2DM
      diagnoses: [hypertension]
    thresholds:
      minimum_day_coverage: 0.5
    rules:
      high_glycemic_variability:
        cv_threshold: 0.33
"#;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    }

    #[test]
    fn patient_layers_override_globals() {
        let settings = PatternSettings::from_yaml(YAML).unwrap();
        let ctx = settings.context_for("p-42", date());

        assert_eq!(ctx.global_override("minimum_day_coverage"), Some(0.5));
        assert_eq!(ctx.global_override("cv_threshold"), Some(0.36));
        assert_eq!(ctx.rule_override("high_glycemic_variability", "cv_threshold"), Some(0.33));
        assert_eq!(
            ctx.rule_override("high_glycemic_variability", "analysis_window_days"),
            Some(7.0)
        );
        assert_eq!(ctx.patient.age, Some(67));
        assert_eq!(ctx.patient.diabetes_type.as_deref(), Some("T2DM"));
    }

    #[test]
    fn unknown_patient_gets_globals_only() {
        let settings = PatternSettings::from_yaml(YAML).unwrap();
        let ctx = settings.context_for("someone-else", date());
        assert_eq!(ctx.global_override("minimum_day_coverage"), Some(0.7));
        assert_eq!(ctx.rule_override("high_glycemic_variability", "cv_threshold"), Some(0.38));
        assert_eq!(ctx.patient, PatientMetadata::default());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = PatternSettings::load(&dir.path().join("absent.yml")).unwrap_err();
        assert!(matches!(err, PatternError::Settings(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.yml");
        fs::write(&path, YAML).unwrap();
        let settings = PatternSettings::load(&path).unwrap();
        assert_eq!(settings.patients.len(), 1);
    }

    #[test]
    fn malformed_yaml_is_settings_error() {
        let err = PatternSettings::from_yaml("thresholds: [1, 2").unwrap_err();
        assert!(matches!(err, PatternError::Settings(_)));
    }
}
