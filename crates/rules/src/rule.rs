use cgm_core::{
    PatternContext, PatternDetection, PatternError, PatternInputBundle, PatternStatus,
    Result, RuleDescriptor,
};

/// The extension point: every detection rule implements this trait.
///
/// Rules are object-safe and `Send + Sync` so one registry can be shared
/// read-only by every worker thread.
///
/// `evaluate` returns `Ok(None)` or a non-triggered detection for expected
/// "nothing to report" outcomes. [`PatternError::InsufficientData`] means the
/// window was too short and is treated by the registry as a skip. Any other
/// error is a genuine defect and is recorded as a failure for this rule.
pub trait PatternRule: Send + Sync {
    /// Static metadata, created once when the rule is constructed.
    fn descriptor(&self) -> &RuleDescriptor;

    /// Evaluate the rule against one analysis date's window.
    fn evaluate(
        &self,
        bundle: &PatternInputBundle,
        context: &PatternContext,
    ) -> Result<Option<PatternDetection>>;

    /// Unique registry key.
    fn id(&self) -> &str {
        &self.descriptor().id
    }

    /// Resolve a threshold: rule-specific override, then global override,
    /// then the descriptor default.
    fn resolved_threshold(&self, context: &PatternContext, name: &str) -> Result<f64> {
        let descriptor = self.descriptor();
        context
            .threshold(&descriptor.id, name)
            .or_else(|| descriptor.default_for(name))
            .ok_or_else(|| PatternError::Configuration {
                rule_id: descriptor.id.clone(),
                name: name.to_string(),
            })
    }

    /// [`resolved_threshold`](Self::resolved_threshold) for whole-number
    /// settings such as day counts. Negative values clamp to zero.
    fn resolved_count(&self, context: &PatternContext, name: &str) -> Result<usize> {
        let value = self.resolved_threshold(context, name)?;
        Ok(value.max(0.0).round() as usize)
    }

    /// Fail with `InsufficientData` when the bundle has fewer summaries
    /// than the descriptor's minimum window.
    fn ensure_validation_window(&self, bundle: &PatternInputBundle) -> Result<()> {
        let descriptor = self.descriptor();
        let available = bundle.summary_count();
        if available < descriptor.min_window_days {
            return Err(PatternError::InsufficientData {
                rule_id: descriptor.id.clone(),
                available,
                required: descriptor.min_window_days,
            });
        }
        Ok(())
    }

    /// A detection stamped with this rule's id, version and the context date.
    fn detection(&self, context: &PatternContext, status: PatternStatus) -> PatternDetection {
        let descriptor = self.descriptor();
        PatternDetection::new(descriptor.id.clone(), context.analysis_date, status)
            .version(descriptor.version.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use cgm_core::DailySummary;

    use super::*;

    struct Fixed {
        descriptor: RuleDescriptor,
    }

    impl PatternRule for Fixed {
        fn descriptor(&self) -> &RuleDescriptor {
            &self.descriptor
        }

        fn evaluate(
            &self,
            bundle: &PatternInputBundle,
            context: &PatternContext,
        ) -> Result<Option<PatternDetection>> {
            self.ensure_validation_window(bundle)?;
            Ok(Some(self.detection(context, PatternStatus::Triggered)))
        }
    }

    fn rule() -> Fixed {
        Fixed {
            descriptor: RuleDescriptor::new("fixed", "Fixed")
                .min_window_days(3)
                .default_threshold("cv_threshold", 0.36),
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn bundle(days: u32) -> PatternInputBundle {
        let summaries = (1..=days).map(|d| Arc::new(DailySummary::empty("p", date(d))));
        PatternInputBundle::new("p", date(1), date(days.max(1)), Vec::new(), summaries)
    }

    #[test]
    fn threshold_resolution_order() {
        let r = rule();
        let base = PatternContext::new("p", date(1));

        // default
        assert_eq!(r.resolved_threshold(&base, "cv_threshold").unwrap(), 0.36);

        // global beats default
        let global = base.clone().with_threshold("cv_threshold", 0.30);
        assert_eq!(r.resolved_threshold(&global, "cv_threshold").unwrap(), 0.30);

        // rule-specific beats global
        let specific = global.with_rule_threshold("fixed", "cv_threshold", 0.42);
        assert_eq!(r.resolved_threshold(&specific, "cv_threshold").unwrap(), 0.42);

        // another rule's override is ignored
        let foreign = base.with_rule_threshold("other", "cv_threshold", 0.99);
        assert_eq!(r.resolved_threshold(&foreign, "cv_threshold").unwrap(), 0.36);
    }

    #[test]
    fn missing_threshold_is_configuration_error() {
        let err = rule()
            .resolved_threshold(&PatternContext::new("p", date(1)), "nope")
            .unwrap_err();
        assert_eq!(
            err,
            PatternError::Configuration {
                rule_id: "fixed".to_string(),
                name: "nope".to_string()
            }
        );
    }

    #[test]
    fn override_without_default_resolves() {
        let ctx = PatternContext::new("p", date(1)).with_threshold("nope", 2.6);
        assert_eq!(rule().resolved_count(&ctx, "nope").unwrap(), 3);
    }

    #[test]
    fn validation_window_check() {
        let r = rule();
        let err = r.ensure_validation_window(&bundle(2)).unwrap_err();
        assert_eq!(
            err,
            PatternError::InsufficientData {
                rule_id: "fixed".to_string(),
                available: 2,
                required: 3
            }
        );
        assert!(r.ensure_validation_window(&bundle(3)).is_ok());
    }

    #[test]
    fn short_window_never_triggers() {
        let r = rule();
        let ctx = PatternContext::new("p", date(2));
        assert!(r.evaluate(&bundle(2), &ctx).is_err());
        let d = r.evaluate(&bundle(3), &ctx).unwrap().unwrap();
        assert_eq!(d.rule_id, "fixed");
        assert_eq!(d.version, "1.0.0");
    }
}
