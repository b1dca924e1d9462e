//! Shared data model for CGM pattern detection.
//!
//! Everything exchanged between the rule registry, the sliding-window
//! engine and the callers lives here: readings and daily summaries, the
//! per-date input bundle, the evaluation context, rule descriptors and
//! the standardized detection record.

pub mod bundle;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod detection;
pub mod error;
pub mod reading;
pub mod settings;
pub mod summary;

pub use bundle::PatternInputBundle;
pub use config::Config;
pub use context::{PatientMetadata, PatternContext, ThresholdMap};
pub use descriptor::{Applicability, RuleDescriptor};
pub use detection::{PatternDetection, PatternStatus};
pub use error::{PatternError, Result};
pub use reading::{CgmDay, Reading};
pub use settings::{PatientSettings, PatternSettings};
pub use summary::DailySummary;
