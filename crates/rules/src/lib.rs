//! Pattern rule contract, registry and discovery.
//!
//! This crate provides:
//! - The [`PatternRule`] trait every detection rule implements
//! - [`RuleRegistry`], which owns rules in registration order and runs
//!   them against one input bundle with per-rule failure isolation
//! - The applicability predicate that skips rules irrelevant to a patient
//! - Explicit module discovery with per-module failure reporting and reload
//! - The built-in rule modules

pub mod applicability;
pub mod builtin;
pub mod discovery;
pub mod filter;
pub mod registry;
pub mod rule;

pub use applicability::should_evaluate_rule;
pub use discovery::{
    builtin_modules, discover_rules, reload_rules, DiscoveryReport, ModuleLoad, ModuleStatus,
    RuleDiscovery, RuleModule,
};
pub use filter::RuleFilter;
pub use registry::{DetectionBatch, RuleFailure, RuleRegistry, SkipReason, SkippedRule};
pub use rule::PatternRule;
