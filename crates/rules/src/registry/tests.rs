//! Tests for the rule registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use cgm_core::{
    DailySummary, PatientMetadata, PatternContext, PatternDetection, PatternError,
    PatternInputBundle, PatternStatus, Result, RuleDescriptor,
};

use super::*;

/// Behaviour of a mock rule's `evaluate`.
#[derive(Clone, Copy)]
enum Behaviour {
    Trigger,
    Silent,
    Fail,
    Panic,
    WrongId,
}

/// Mock rule that counts invocations.
struct MockRule {
    descriptor: RuleDescriptor,
    behaviour: Behaviour,
    calls: Arc<AtomicUsize>,
}

impl MockRule {
    fn new(id: &str, behaviour: Behaviour) -> Self {
        Self {
            descriptor: RuleDescriptor::new(id, id).min_window_days(3),
            behaviour,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_descriptor(mut self, f: impl FnOnce(RuleDescriptor) -> RuleDescriptor) -> Self {
        self.descriptor = f(self.descriptor);
        self
    }

    fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl PatternRule for MockRule {
    fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    fn evaluate(
        &self,
        bundle: &PatternInputBundle,
        context: &PatternContext,
    ) -> Result<Option<PatternDetection>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.ensure_validation_window(bundle)?;
        match self.behaviour {
            Behaviour::Trigger => Ok(Some(
                self.detection(context, PatternStatus::Triggered)
                    .metric("summaries", bundle.summary_count() as f64),
            )),
            Behaviour::Silent => Ok(None),
            Behaviour::Fail => Err(PatternError::MalformedBundle("bad bundle".to_string())),
            Behaviour::Panic => panic!("boom"),
            Behaviour::WrongId => Ok(Some(PatternDetection::new(
                "someone_else",
                context.analysis_date,
                PatternStatus::Triggered,
            ))),
        }
    }
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn bundle(days: u32) -> PatternInputBundle {
    let summaries = (1..=days).map(|d| Arc::new(DailySummary::empty("p1", date(d))));
    PatternInputBundle::new("p1", date(1), date(days.max(1)), Vec::new(), summaries)
}

fn context() -> PatternContext {
    PatternContext::new("p1", date(7))
}

fn ids(batch: &DetectionBatch) -> Vec<&str> {
    batch.detections.iter().map(|d| d.rule_id.as_str()).collect()
}

// ── Registration ────────────────────────────────────────────────────

#[test]
fn register_and_lookup() {
    let mut registry = RuleRegistry::new();
    registry.register(MockRule::new("a", Behaviour::Trigger)).unwrap();

    assert_eq!(registry.len(), 1);
    assert!(registry.contains("a"));
    assert!(registry.get("a").is_some());
    assert!(registry.get("missing").is_none());
}

#[test]
fn duplicate_registration_is_rejected_and_registry_unchanged() {
    let mut registry = RuleRegistry::new();
    let first = MockRule::new("dup", Behaviour::Trigger);
    let first_calls = first.counter();
    registry.register(first).unwrap();

    let err = registry
        .register(MockRule::new("dup", Behaviour::Fail))
        .unwrap_err();
    assert_eq!(err, PatternError::DuplicateRule("dup".to_string()));
    assert_eq!(registry.len(), 1);

    // The original instance is still the one that runs.
    let batch = registry.detect_all(&bundle(5), &context(), None);
    assert_eq!(ids(&batch), vec!["dup"]);
    assert_eq!(first_calls.load(Ordering::Relaxed), 1);
}

#[test]
fn clear_empties_registry() {
    let mut registry = RuleRegistry::new();
    registry.register(MockRule::new("a", Behaviour::Trigger)).unwrap();
    registry.clear();
    assert!(registry.is_empty());
    registry.register(MockRule::new("a", Behaviour::Trigger)).unwrap();
    assert_eq!(registry.len(), 1);
}

#[test]
fn ids_follow_registration_order() {
    let mut registry = RuleRegistry::new();
    for id in ["zeta", "alpha", "mid"] {
        registry.register(MockRule::new(id, Behaviour::Trigger)).unwrap();
    }
    assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
}

// ── detect_all ──────────────────────────────────────────────────────

#[test]
fn detections_in_registration_order_and_deterministic() {
    let mut registry = RuleRegistry::new();
    for id in ["c", "a", "b"] {
        registry.register(MockRule::new(id, Behaviour::Trigger)).unwrap();
    }
    let (b, ctx) = (bundle(5), context());

    let first = registry.detect_all(&b, &ctx, None);
    let second = registry.detect_all(&b, &ctx, None);

    assert_eq!(ids(&first), vec!["c", "a", "b"]);
    assert_eq!(first, second);
}

#[test]
fn failure_isolation_middle_rule() {
    let mut registry = RuleRegistry::new();
    registry.register(MockRule::new("first", Behaviour::Trigger)).unwrap();
    registry.register(MockRule::new("broken", Behaviour::Fail)).unwrap();
    registry.register(MockRule::new("third", Behaviour::Trigger)).unwrap();

    let batch = registry.detect_all(&bundle(5), &context(), None);

    assert_eq!(ids(&batch), vec!["first", "third"]);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].rule_id, "broken");
    assert_eq!(
        batch.failures[0].cause,
        Some(PatternError::MalformedBundle("bad bundle".to_string()))
    );
    assert!(matches!(
        batch.failures[0].to_error(),
        PatternError::RuleExecution { ref rule_id, .. } if rule_id == "broken"
    ));
}

#[test]
fn panicking_rule_is_isolated() {
    let mut registry = RuleRegistry::new();
    registry.register(MockRule::new("first", Behaviour::Trigger)).unwrap();
    registry.register(MockRule::new("panics", Behaviour::Panic)).unwrap();
    registry.register(MockRule::new("third", Behaviour::Trigger)).unwrap();

    let batch = registry.detect_all(&bundle(5), &context(), None);

    assert_eq!(ids(&batch), vec!["first", "third"]);
    assert_eq!(batch.failed_rule_ids().collect::<Vec<_>>(), vec!["panics"]);
    assert!(batch.failures[0].message.contains("boom"));
    assert!(batch.failures[0].cause.is_none());
}

#[test]
fn insufficient_window_is_skip_not_failure() {
    let mut registry = RuleRegistry::new();
    let rule = MockRule::new("needs3", Behaviour::Trigger);
    let calls = rule.counter();
    registry.register(rule).unwrap();

    let batch = registry.detect_all(&bundle(2), &context(), None);

    assert!(batch.detections.is_empty());
    assert!(batch.failures.is_empty());
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(
        batch.skipped,
        vec![SkippedRule {
            rule_id: "needs3".to_string(),
            reason: SkipReason::InsufficientData {
                available: 2,
                required: 3
            },
        }]
    );
}

#[test]
fn inapplicable_rule_is_never_invoked() {
    let mut registry = RuleRegistry::new();
    let pediatric = MockRule::new("pediatric", Behaviour::Trigger)
        .with_descriptor(|d| d.age_range(None, Some(17)));
    let calls = pediatric.counter();
    registry.register(pediatric).unwrap();
    registry.register(MockRule::new("everyone", Behaviour::Trigger)).unwrap();

    let adult = context().with_patient(PatientMetadata {
        age: Some(52),
        ..PatientMetadata::default()
    });
    let batch = registry.detect_all(&bundle(5), &adult, None);

    assert_eq!(calls.load(Ordering::Relaxed), 0);
    assert_eq!(ids(&batch), vec!["everyone"]);
    assert_eq!(batch.skipped[0].rule_id, "pediatric");
    assert_eq!(batch.skipped[0].reason, SkipReason::NotApplicable);
}

#[test]
fn filter_restricts_to_exact_ids() {
    let mut registry = RuleRegistry::new();
    let skipped = MockRule::new("b", Behaviour::Trigger);
    let skipped_calls = skipped.counter();
    registry.register(MockRule::new("a", Behaviour::Trigger)).unwrap();
    registry.register(skipped).unwrap();
    registry.register(MockRule::new("c", Behaviour::Trigger)).unwrap();

    // Filter order does not matter; output keeps registration order.
    let filter = RuleFilter::new(["c", "a", "B"]);
    let batch = registry.detect_all(&bundle(5), &context(), Some(&filter));

    assert_eq!(ids(&batch), vec!["a", "c"]);
    assert_eq!(skipped_calls.load(Ordering::Relaxed), 0);
}

#[test]
fn silent_rule_contributes_nothing() {
    let mut registry = RuleRegistry::new();
    registry.register(MockRule::new("quiet", Behaviour::Silent)).unwrap();
    let batch = registry.detect_all(&bundle(5), &context(), None);
    assert_eq!(batch, DetectionBatch::default());
}

#[test]
fn foreign_rule_id_is_a_failure() {
    let mut registry = RuleRegistry::new();
    registry.register(MockRule::new("liar", Behaviour::WrongId)).unwrap();
    let batch = registry.detect_all(&bundle(5), &context(), None);
    assert!(batch.detections.is_empty());
    assert_eq!(batch.failed_rule_ids().collect::<Vec<_>>(), vec!["liar"]);
}

#[test]
fn batch_serializes_skip_reasons_inline() {
    let mut registry = RuleRegistry::new();
    registry.register(MockRule::new("needs3", Behaviour::Trigger)).unwrap();
    registry
        .register(MockRule::new("broken", Behaviour::Fail).with_descriptor(|d| d.min_window_days(1)))
        .unwrap();

    let batch = registry.detect_all(&bundle(2), &context(), None);
    let json = serde_json::to_value(&batch).unwrap();

    assert_eq!(json["skipped"][0]["rule_id"], "needs3");
    assert_eq!(json["skipped"][0]["reason"], "insufficient_data");
    assert_eq!(json["skipped"][0]["required"], 3);
    // the typed cause stays out of the wire format
    assert_eq!(json["failures"][0]["rule_id"], "broken");
    assert!(json["failures"][0].get("cause").is_none());
}
