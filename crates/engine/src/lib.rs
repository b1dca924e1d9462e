//! Sliding-window evaluation of CGM pattern rules.
//!
//! A [`SlidingWindowEngine`] walks one patient's analysis dates in order,
//! fetching calendar days from a [`DailyCgmSource`], deriving and caching
//! daily summaries, and handing each date's window to the shared
//! [`cgm_rules::RuleRegistry`]. [`BatchRunner`] fans patients out over a
//! bounded worker pool.

pub mod batch;
pub mod cache;
pub mod engine;
pub mod error;
pub mod features;
pub mod source;

pub use batch::{BatchReport, BatchRunner, PatientOutcome, PatientStatus, TriggeredSummary};
pub use cache::DailySummaryCache;
pub use engine::{DateDetections, PatientRun, SlidingWindowEngine};
pub use error::EngineError;
pub use features::{compute_daily_summary, StandardSummaries, SummaryDeriver};
pub use source::{DailyCgmSource, InMemorySource, JsonDirSource};
