//! Decides whether a rule is relevant for a patient, independent of
//! whether it would trigger.

use std::collections::BTreeSet;

use cgm_core::{PatternContext, RuleDescriptor};

/// Requirement token that makes a rule apply regardless of diagnosis.
const GENERAL_TOKEN: &str = "general";

fn tokenize<'a>(values: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    values
        .into_iter()
        .flat_map(|v| v.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '/')))
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// True when `descriptor`'s rule should run for the patient in `context`.
///
/// - Diagnosis: skipped only when both the rule's requirement and the
///   patient's diagnoses are known, share no token, and the requirement
///   does not include `general`.
/// - Age: skipped when the patient's known age is outside the rule's band.
///   Unknown age never excludes.
pub fn should_evaluate_rule(descriptor: &RuleDescriptor, context: &PatternContext) -> bool {
    let applicability = &descriptor.applicability;
    let patient = &context.patient;

    if let Some(requirement) = applicability.diagnosis_context.as_deref() {
        let required = tokenize([requirement]);
        let available = tokenize(
            patient
                .diagnoses
                .iter()
                .map(String::as_str)
                .chain(patient.diabetes_type.as_deref()),
        );
        if !required.is_empty()
            && !available.is_empty()
            && !required.contains(GENERAL_TOKEN)
            && required.is_disjoint(&available)
        {
            return false;
        }
    }

    if let Some(age) = patient.age {
        if applicability.min_age.is_some_and(|min| age < min) {
            return false;
        }
        if applicability.max_age.is_some_and(|max| age > max) {
            return false;
        }
    }

    true
}
