//! Glycemic variability rules.

use std::sync::Arc;

use cgm_core::{
    PatternContext, PatternDetection, PatternError, PatternInputBundle, PatternStatus, Result,
    RuleDescriptor,
};

use super::stats::{covered_days, pooled_stats, require_days};
use crate::rule::PatternRule;

pub fn rules() -> Result<Vec<Arc<dyn PatternRule>>> {
    Ok(vec![Arc::new(HighGlycemicVariability::new())])
}

/// Pooled coefficient of variation over the recent window at or above
/// `cv_threshold`.
pub struct HighGlycemicVariability {
    descriptor: RuleDescriptor,
}

impl HighGlycemicVariability {
    pub const ID: &'static str = "high_glycemic_variability";

    pub fn new() -> Self {
        Self {
            descriptor: RuleDescriptor::new(Self::ID, "High Glycemic Variability")
                .description("Pooled CV >= 36% across the recent analysis window")
                .version("1.1.0")
                .min_window_days(7)
                .default_threshold("cv_threshold", 0.36)
                .default_threshold("analysis_window_days", 7.0)
                .default_threshold("minimum_day_coverage", 0.7)
                .diagnosis_context("T2DM/General")
                .tags(&["macro", "variability"]),
        }
    }
}

impl Default for HighGlycemicVariability {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternRule for HighGlycemicVariability {
    fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    fn evaluate(
        &self,
        bundle: &PatternInputBundle,
        context: &PatternContext,
    ) -> Result<Option<PatternDetection>> {
        self.ensure_validation_window(bundle)?;

        let cv_threshold = self.resolved_threshold(context, "cv_threshold")?;
        let coverage = self.resolved_threshold(context, "minimum_day_coverage")?;
        let window = self
            .resolved_count(context, "analysis_window_days")?
            .max(self.descriptor.min_window_days);

        let days = covered_days(bundle.recent_summaries(window), coverage);
        require_days(Self::ID, days.len(), self.descriptor.min_window_days)?;

        let pooled = pooled_stats(&days).ok_or_else(|| {
            PatternError::MalformedBundle("covered days carry no glucose statistics".to_string())
        })?;
        let variable_days: Vec<_> = days
            .iter()
            .filter(|s| s.coefficient_of_variation().is_some_and(|cv| cv >= cv_threshold))
            .collect();

        let status = if pooled.cv >= cv_threshold {
            PatternStatus::Triggered
        } else {
            PatternStatus::NotTriggered
        };

        let mut detection = self
            .detection(context, status)
            .metric("cv", pooled.cv)
            .metric("cv_threshold", cv_threshold)
            .metric("mean_glucose", pooled.mean)
            .metric("std_glucose", pooled.std)
            .metric("days_considered", days.len() as f64)
            .metric("high_variability_days", variable_days.len() as f64)
            .confidence(pooled.cv / cv_threshold.max(f64::EPSILON))
            .evidence(format!(
                "CV {:.1}% over {} days (threshold {:.1}%)",
                pooled.cv * 100.0,
                days.len(),
                cv_threshold * 100.0
            ));
        for day in variable_days.iter().take(3) {
            if let Some(cv) = day.coefficient_of_variation() {
                detection = detection.evidence(format!("{}: CV {:.1}%", day.date, cv * 100.0));
            }
        }
        Ok(Some(detection))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use cgm_core::DailySummary;

    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn bundle(days: u32, mean: f64, std: f64) -> PatternInputBundle {
        let summaries = (1..=days).map(|d| {
            let mut s = DailySummary::empty("p", date(d));
            s.total_readings = 288;
            s.mean_glucose = Some(mean);
            s.std_glucose = Some(std);
            s.coverage_ratio = 1.0;
            Arc::new(s)
        });
        PatternInputBundle::new("p", date(1), date(days), Vec::new(), summaries)
    }

    #[test]
    fn triggers_at_high_cv() {
        let rule = HighGlycemicVariability::new();
        let ctx = PatternContext::new("p", date(10));
        let d = rule.evaluate(&bundle(10, 100.0, 42.0), &ctx).unwrap().unwrap();
        assert_eq!(d.status, PatternStatus::Triggered);
        assert!((d.metrics["cv"] - 0.42).abs() < 1e-9);
        assert_eq!(d.metrics["days_considered"], 7.0);
        assert_eq!(d.confidence, Some(1.0));
    }

    #[test]
    fn low_cv_is_not_triggered() {
        let rule = HighGlycemicVariability::new();
        let ctx = PatternContext::new("p", date(10));
        let d = rule.evaluate(&bundle(10, 150.0, 30.0), &ctx).unwrap().unwrap();
        assert_eq!(d.status, PatternStatus::NotTriggered);
    }

    #[test]
    fn override_changes_outcome() {
        let rule = HighGlycemicVariability::new();
        let ctx = PatternContext::new("p", date(10))
            .with_rule_threshold(HighGlycemicVariability::ID, "cv_threshold", 0.5);
        let d = rule.evaluate(&bundle(10, 100.0, 42.0), &ctx).unwrap().unwrap();
        assert_eq!(d.status, PatternStatus::NotTriggered);
    }

    #[test]
    fn zero_threshold_keeps_confidence_finite() {
        let rule = HighGlycemicVariability::new();
        let ctx = PatternContext::new("p", date(10))
            .with_rule_threshold(HighGlycemicVariability::ID, "cv_threshold", 0.0);
        let d = rule.evaluate(&bundle(10, 100.0, 0.0), &ctx).unwrap().unwrap();
        assert_eq!(d.status, PatternStatus::Triggered);
        assert_eq!(d.confidence, Some(0.0));
    }

    #[test]
    fn short_window_is_insufficient() {
        let rule = HighGlycemicVariability::new();
        let ctx = PatternContext::new("p", date(5));
        let err = rule.evaluate(&bundle(5, 100.0, 42.0), &ctx).unwrap_err();
        assert!(err.is_insufficient_data());
    }
}
