//! Explicit rule discovery.
//!
//! Each rule module contributes a factory; discovery walks the module
//! table in name order and registers whatever each factory returns. A
//! module whose factory fails (or panics) is reported and skipped without
//! aborting discovery of the others. Duplicate rule ids are a startup
//! misconfiguration and abort discovery immediately.

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use cgm_core::{PatternError, Result};
use tracing::{info, warn};

use crate::builtin;
use crate::registry::RuleRegistry;
use crate::rule::PatternRule;

/// Builds the rule instances a module defines.
pub type RuleFactory = fn() -> Result<Vec<Arc<dyn PatternRule>>>;

/// One discoverable rule module.
#[derive(Clone, Copy)]
pub struct RuleModule {
    pub name: &'static str,
    pub factory: RuleFactory,
}

impl RuleModule {
    pub const fn new(name: &'static str, factory: RuleFactory) -> Self {
        Self { name, factory }
    }
}

impl std::fmt::Debug for RuleModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleModule").field("name", &self.name).finish()
    }
}

/// The modules shipped with this crate.
pub fn builtin_modules() -> Vec<RuleModule> {
    vec![
        RuleModule::new("macro_control", builtin::macro_control::rules),
        RuleModule::new("nocturnal", builtin::nocturnal::rules),
        RuleModule::new("variability", builtin::variability::rules),
    ]
}

/// Outcome of loading a single module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleLoad {
    pub module: String,
    pub status: ModuleStatus,
}

/// Status of a single module load attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleStatus {
    /// Rules were registered, in this order.
    Loaded { rule_ids: Vec<String> },
    /// The module was disabled by name.
    Skipped { reason: String },
    /// The factory failed; nothing from this module was registered.
    Failed { error: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryReport {
    pub modules: Vec<ModuleLoad>,
}

impl DiscoveryReport {
    pub fn loaded_rule_ids(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().flat_map(|m| match &m.status {
            ModuleStatus::Loaded { rule_ids } => {
                rule_ids.iter().map(String::as_str).collect::<Vec<_>>()
            }
            _ => Vec::new(),
        })
    }

    pub fn failed_modules(&self) -> impl Iterator<Item = (&str, &str)> {
        self.modules.iter().filter_map(|m| match &m.status {
            ModuleStatus::Failed { error } => Some((m.module.as_str(), error.as_str())),
            _ => None,
        })
    }
}

/// An ordered module table plus the names disabled for this process.
#[derive(Debug, Clone)]
pub struct RuleDiscovery {
    modules: Vec<RuleModule>,
    disabled: BTreeSet<String>,
}

impl RuleDiscovery {
    /// Discovery over `modules`, visited in name order.
    pub fn new(mut modules: Vec<RuleModule>) -> Self {
        modules.sort_by_key(|m| m.name);
        Self {
            modules,
            disabled: BTreeSet::new(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_modules())
    }

    pub fn disable(mut self, module: impl Into<String>) -> Self {
        self.disabled.insert(module.into());
        self
    }

    pub fn module_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.modules.iter().map(|m| m.name)
    }

    /// Register every module's rules into `registry`.
    pub fn discover(&self, registry: &mut RuleRegistry) -> Result<DiscoveryReport> {
        let mut report = DiscoveryReport::default();

        for module in &self.modules {
            if self.disabled.contains(module.name) {
                info!(module = module.name, "rule module disabled");
                report.modules.push(ModuleLoad {
                    module: module.name.to_string(),
                    status: ModuleStatus::Skipped {
                        reason: "disabled".to_string(),
                    },
                });
                continue;
            }

            let status = match load_module(module) {
                Ok(rules) => {
                    check_ids(registry, &rules)?;
                    let mut rule_ids = Vec::with_capacity(rules.len());
                    for rule in rules {
                        rule_ids.push(rule.id().to_string());
                        registry.register_shared(rule)?;
                    }
                    info!(module = module.name, rules = rule_ids.len(), "loaded rule module");
                    ModuleStatus::Loaded { rule_ids }
                }
                Err(e) => {
                    warn!(module = module.name, error = %e, "failed to load rule module");
                    ModuleStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            report.modules.push(ModuleLoad {
                module: module.name.to_string(),
                status,
            });
        }

        Ok(report)
    }

    /// Clear `registry`, then discover again.
    pub fn reload(&self, registry: &mut RuleRegistry) -> Result<DiscoveryReport> {
        info!(previous = registry.len(), "reloading rules");
        registry.clear();
        self.discover(registry)
    }
}

/// Run a module factory, converting a panic into an error.
fn load_module(module: &RuleModule) -> Result<Vec<Arc<dyn PatternRule>>> {
    match catch_unwind(AssertUnwindSafe(module.factory)) {
        Ok(result) => result,
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(PatternError::ModuleLoad {
                module: module.name.to_string(),
                message: format!("panicked: {}", message),
            })
        }
    }
}

/// Reject a module whose ids collide with the registry or with each other,
/// before any of its rules are registered.
fn check_ids(registry: &RuleRegistry, rules: &[Arc<dyn PatternRule>]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for rule in rules {
        let id = rule.id();
        if registry.contains(id) || !seen.insert(id) {
            return Err(PatternError::DuplicateRule(id.to_string()));
        }
    }
    Ok(())
}

/// Register the built-in modules into `registry`.
pub fn discover_rules(registry: &mut RuleRegistry) -> Result<DiscoveryReport> {
    RuleDiscovery::builtin().discover(registry)
}

/// Clear `registry` and register the built-in modules again.
pub fn reload_rules(registry: &mut RuleRegistry) -> Result<DiscoveryReport> {
    RuleDiscovery::builtin().reload(registry)
}
