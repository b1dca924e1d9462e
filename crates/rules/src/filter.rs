use std::collections::BTreeSet;

use cgm_core::{PatternError, Result};

use crate::registry::RuleRegistry;

/// Restricts evaluation to a set of rule ids.
///
/// Matching is exact and case-sensitive; no glob or prefix matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFilter {
    ids: BTreeSet<String>,
}

impl RuleFilter {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, rule_id: &str) -> bool {
        self.ids.contains(rule_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Fail with `UnknownRule` for the first id that is not registered.
    pub fn validate(&self, registry: &RuleRegistry) -> Result<()> {
        match self.ids().find(|id| !registry.contains(id)) {
            Some(unknown) => Err(PatternError::UnknownRule(unknown.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_only() {
        let f = RuleFilter::new(["high_glycemic_variability"]);
        assert!(f.allows("high_glycemic_variability"));
        assert!(!f.allows("HIGH_GLYCEMIC_VARIABILITY"));
        assert!(!f.allows("high_glycemic"));
        assert!(!f.allows("high_*"));
    }

    #[test]
    fn validate_rejects_unknown_ids() {
        let registry = RuleRegistry::new();
        let err = RuleFilter::new(["ghost"]).validate(&registry).unwrap_err();
        assert_eq!(err, PatternError::UnknownRule("ghost".to_string()));
        assert!(RuleFilter::default().validate(&registry).is_ok());
    }
}
