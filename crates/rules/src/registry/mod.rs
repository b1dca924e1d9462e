//! Rule registry: owns rules keyed by id and mediates bulk evaluation.

mod batch;

#[cfg(test)]
mod tests;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use cgm_core::{PatternContext, PatternDetection, PatternError, PatternInputBundle, Result};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::applicability::should_evaluate_rule;
use crate::filter::RuleFilter;
use crate::rule::PatternRule;

pub use self::batch::{DetectionBatch, RuleFailure, SkipReason, SkippedRule};

/// Holds every registered rule in registration order.
///
/// Populated once before evaluation starts (see [`crate::discovery`]) and
/// then shared read-only, typically behind an `Arc`, by all workers.
/// Iteration order is registration order, so identical inputs always
/// produce identical output.
#[derive(Default)]
pub struct RuleRegistry {
    rules: IndexMap<String, Arc<dyn PatternRule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            rules: IndexMap::new(),
        }
    }

    /// Register a rule. Fails with `DuplicateRule` if the id is taken,
    /// leaving the registry unchanged.
    pub fn register<R: PatternRule + 'static>(&mut self, rule: R) -> Result<()> {
        self.register_shared(Arc::new(rule))
    }

    /// Register an already shared rule instance.
    pub fn register_shared(&mut self, rule: Arc<dyn PatternRule>) -> Result<()> {
        let id = rule.id().to_string();
        if self.rules.contains_key(&id) {
            return Err(PatternError::DuplicateRule(id));
        }
        debug!(rule_id = %id, "registered rule");
        self.rules.insert(id, rule);
        Ok(())
    }

    /// Remove every rule, e.g. before a reload.
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn PatternRule>> {
        self.rules.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PatternRule>> {
        self.rules.values()
    }

    /// Run every applicable rule (optionally restricted by `filter`) against
    /// one bundle.
    ///
    /// - Rules excluded by the applicability predicate are never invoked.
    /// - `InsufficientData` is recorded as a skip, not a failure.
    /// - Any other error, a panic, or a detection carrying a foreign rule id
    ///   is recorded as a failure for that rule; the remaining rules still run.
    pub fn detect_all(
        &self,
        bundle: &PatternInputBundle,
        context: &PatternContext,
        filter: Option<&RuleFilter>,
    ) -> DetectionBatch {
        let mut batch = DetectionBatch::default();

        for (id, rule) in &self.rules {
            if filter.is_some_and(|f| !f.allows(id)) {
                continue;
            }

            if !should_evaluate_rule(rule.descriptor(), context) {
                debug!(rule_id = %id, patient_id = %context.patient_id, "rule not applicable");
                batch.skipped.push(SkippedRule {
                    rule_id: id.clone(),
                    reason: SkipReason::NotApplicable,
                });
                continue;
            }

            match evaluate_isolated(rule.as_ref(), bundle, context) {
                Ok(Some(detection)) if detection.rule_id == *id => {
                    batch.detections.push(detection);
                }
                Ok(Some(detection)) => {
                    let message = format!(
                        "emitted a detection for rule '{}'",
                        detection.rule_id
                    );
                    warn!(rule_id = %id, error = %message, "rule failed");
                    batch.failures.push(RuleFailure {
                        rule_id: id.clone(),
                        message,
                        cause: None,
                    });
                }
                Ok(None) => {}
                Err(PatternError::InsufficientData {
                    available,
                    required,
                    ..
                }) => {
                    debug!(rule_id = %id, available, required, "insufficient window");
                    batch.skipped.push(SkippedRule {
                        rule_id: id.clone(),
                        reason: SkipReason::InsufficientData {
                            available,
                            required,
                        },
                    });
                }
                Err(err) => {
                    warn!(
                        rule_id = %id,
                        patient_id = %context.patient_id,
                        date = %context.analysis_date,
                        error = %err,
                        "rule failed"
                    );
                    let message = match &err {
                        PatternError::RuleExecution { message, .. } => message.clone(),
                        other => other.to_string(),
                    };
                    let cause = match err {
                        PatternError::RuleExecution { .. } => None,
                        other => Some(other),
                    };
                    batch.failures.push(RuleFailure {
                        rule_id: id.clone(),
                        message,
                        cause,
                    });
                }
            }
        }

        batch
    }
}

/// Invoke `rule.evaluate`, converting a panic into `RuleExecution`.
fn evaluate_isolated(
    rule: &dyn PatternRule,
    bundle: &PatternInputBundle,
    context: &PatternContext,
) -> Result<Option<PatternDetection>> {
    match catch_unwind(AssertUnwindSafe(|| rule.evaluate(bundle, context))) {
        Ok(result) => result,
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(PatternError::RuleExecution {
                rule_id: rule.id().to_string(),
                message: format!("panicked: {}", message),
            })
        }
    }
}
