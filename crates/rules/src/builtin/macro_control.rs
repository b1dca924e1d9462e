//! Whole-day control rules: time above, below and in range.

use std::sync::Arc;

use cgm_core::{
    PatternContext, PatternDetection, PatternInputBundle, PatternStatus, Result, RuleDescriptor,
};

use super::stats::{covered_days, pooled_fraction, pooled_stats, require_days};
use crate::rule::PatternRule;

pub fn rules() -> Result<Vec<Arc<dyn PatternRule>>> {
    Ok(vec![
        Arc::new(PredominantHyperglycemia::new()),
        Arc::new(PredominantHypoglycemia::new()),
        Arc::new(StableNearTargetControl::new()),
    ])
}

/// Fraction of `days` that matched.
fn recurrence(days: usize, matching: usize) -> f64 {
    if days == 0 {
        0.0
    } else {
        matching as f64 / days as f64
    }
}

// ── Predominant hyperglycemia ───────────────────────────────────────

/// Time above range over `high_fraction_threshold` on a recurring share of days.
pub struct PredominantHyperglycemia {
    descriptor: RuleDescriptor,
}

impl PredominantHyperglycemia {
    pub const ID: &'static str = "predominant_hyperglycemia";

    pub fn new() -> Self {
        Self {
            descriptor: RuleDescriptor::new(Self::ID, "Predominant Hyperglycemia")
                .description("TAR > 30% on >= 40% of days")
                .min_window_days(7)
                .default_threshold("high_fraction_threshold", 0.30)
                .default_threshold("recurrence_fraction", 0.40)
                .default_threshold("analysis_window_days", 7.0)
                .default_threshold("minimum_day_coverage", 0.7)
                .diagnosis_context("T2DM/General")
                .tags(&["macro"]),
        }
    }
}

impl Default for PredominantHyperglycemia {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternRule for PredominantHyperglycemia {
    fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    fn evaluate(
        &self,
        bundle: &PatternInputBundle,
        context: &PatternContext,
    ) -> Result<Option<PatternDetection>> {
        self.ensure_validation_window(bundle)?;

        let high_fraction = self.resolved_threshold(context, "high_fraction_threshold")?;
        let required_share = self.resolved_threshold(context, "recurrence_fraction")?;
        let coverage = self.resolved_threshold(context, "minimum_day_coverage")?;
        let window = self
            .resolved_count(context, "analysis_window_days")?
            .max(self.descriptor.min_window_days);

        let days = covered_days(bundle.recent_summaries(window), coverage);
        require_days(Self::ID, days.len(), self.descriptor.min_window_days)?;

        let high_days = days.iter().filter(|s| s.percent_high > high_fraction).count();
        let share = recurrence(days.len(), high_days);
        let status = if share >= required_share {
            PatternStatus::Triggered
        } else {
            PatternStatus::NotTriggered
        };

        Ok(Some(
            self.detection(context, status)
                .metric("high_days", high_days as f64)
                .metric("days_considered", days.len() as f64)
                .metric("recurrence", share)
                .metric(
                    "time_above_range",
                    pooled_fraction(&days, |s| s.percent_high).unwrap_or(0.0),
                )
                .confidence(share / required_share.max(f64::EPSILON))
                .evidence(format!(
                    "{} of {} days above {:.0}% time-above-range",
                    high_days,
                    days.len(),
                    high_fraction * 100.0
                )),
        ))
    }
}

// ── Predominant hypoglycemia ────────────────────────────────────────

/// Time below range at or over `low_fraction_threshold` on a recurring
/// share of days, or any reading under the severe threshold.
pub struct PredominantHypoglycemia {
    descriptor: RuleDescriptor,
}

impl PredominantHypoglycemia {
    pub const ID: &'static str = "predominant_hypoglycemia";

    pub fn new() -> Self {
        Self {
            descriptor: RuleDescriptor::new(Self::ID, "Predominant Hypoglycemia")
                .description("TBR < 70 >= 4% on >= 40% of days, or any reading < 54")
                .min_window_days(7)
                .default_threshold("low_fraction_threshold", 0.04)
                .default_threshold("severe_low_threshold", 54.0)
                .default_threshold("recurrence_fraction", 0.40)
                .default_threshold("analysis_window_days", 7.0)
                .default_threshold("minimum_day_coverage", 0.7)
                .diagnosis_context("T2DM/General")
                .tags(&["macro", "safety"]),
        }
    }
}

impl Default for PredominantHypoglycemia {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternRule for PredominantHypoglycemia {
    fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    fn evaluate(
        &self,
        bundle: &PatternInputBundle,
        context: &PatternContext,
    ) -> Result<Option<PatternDetection>> {
        self.ensure_validation_window(bundle)?;

        let low_fraction = self.resolved_threshold(context, "low_fraction_threshold")?;
        let severe = self.resolved_threshold(context, "severe_low_threshold")?;
        let required_share = self.resolved_threshold(context, "recurrence_fraction")?;
        let coverage = self.resolved_threshold(context, "minimum_day_coverage")?;
        let window = self
            .resolved_count(context, "analysis_window_days")?
            .max(self.descriptor.min_window_days);

        let days = covered_days(bundle.recent_summaries(window), coverage);
        require_days(Self::ID, days.len(), self.descriptor.min_window_days)?;

        let low_days = days.iter().filter(|s| s.percent_low >= low_fraction).count();
        let severe_days: Vec<_> = days
            .iter()
            .filter(|s| s.min_glucose.is_some_and(|m| m < severe))
            .collect();
        let share = recurrence(days.len(), low_days);
        let status = if share >= required_share || !severe_days.is_empty() {
            PatternStatus::Triggered
        } else {
            PatternStatus::NotTriggered
        };

        let mut detection = self
            .detection(context, status)
            .metric("low_days", low_days as f64)
            .metric("severe_low_days", severe_days.len() as f64)
            .metric("days_considered", days.len() as f64)
            .metric("recurrence", share)
            .metric(
                "time_below_range",
                pooled_fraction(&days, |s| s.percent_low).unwrap_or(0.0),
            )
            .evidence(format!(
                "{} of {} days at or above {:.0}% time-below-range",
                low_days,
                days.len(),
                low_fraction * 100.0
            ));
        if status == PatternStatus::Triggered {
            detection = detection.confidence(if severe_days.is_empty() {
                share / required_share.max(f64::EPSILON)
            } else {
                1.0
            });
        }
        for day in severe_days.iter().take(3) {
            if let Some(min) = day.min_glucose {
                detection = detection.evidence(format!("{}: minimum {:.0} mg/dL", day.date, min));
            }
        }
        Ok(Some(detection))
    }
}

// ── Stable near-target control ──────────────────────────────────────

/// Pooled time in range at or above `tir_threshold` with CV below
/// `cv_threshold`. Adult targets only.
pub struct StableNearTargetControl {
    descriptor: RuleDescriptor,
}

impl StableNearTargetControl {
    pub const ID: &'static str = "stable_near_target_control";

    pub fn new() -> Self {
        Self {
            descriptor: RuleDescriptor::new(Self::ID, "Stable / Near-Target Control")
                .description("TIR >= 70% and CV < 36%")
                .min_window_days(7)
                .default_threshold("tir_threshold", 0.70)
                .default_threshold("cv_threshold", 0.36)
                .default_threshold("analysis_window_days", 7.0)
                .default_threshold("minimum_day_coverage", 0.7)
                .diagnosis_context("T2DM/General")
                .age_range(Some(18), None)
                .tags(&["macro", "stability"]),
        }
    }
}

impl Default for StableNearTargetControl {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternRule for StableNearTargetControl {
    fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    fn evaluate(
        &self,
        bundle: &PatternInputBundle,
        context: &PatternContext,
    ) -> Result<Option<PatternDetection>> {
        self.ensure_validation_window(bundle)?;

        let tir_threshold = self.resolved_threshold(context, "tir_threshold")?;
        let cv_threshold = self.resolved_threshold(context, "cv_threshold")?;
        let coverage = self.resolved_threshold(context, "minimum_day_coverage")?;
        let window = self
            .resolved_count(context, "analysis_window_days")?
            .max(self.descriptor.min_window_days);

        let days = covered_days(bundle.recent_summaries(window), coverage);
        require_days(Self::ID, days.len(), self.descriptor.min_window_days)?;

        let (Some(tir), Some(pooled)) = (
            pooled_fraction(&days, |s| s.percent_in_range),
            pooled_stats(&days),
        ) else {
            return Ok(None);
        };

        let status = if tir >= tir_threshold && pooled.cv < cv_threshold {
            PatternStatus::Triggered
        } else {
            PatternStatus::NotTriggered
        };

        Ok(Some(
            self.detection(context, status)
                .metric("time_in_range", tir)
                .metric("cv", pooled.cv)
                .metric("days_considered", days.len() as f64)
                .evidence(format!(
                    "TIR {:.0}% and CV {:.1}% over {} days",
                    tir * 100.0,
                    pooled.cv * 100.0,
                    days.len()
                )),
        ))
    }
}
