use chrono::NaiveDate;
use thiserror::Error;

/// Every failure the detection pipeline distinguishes.
///
/// The registry and the engine match on the variant to decide whether a
/// failure is a skip, a per-rule failure, a per-patient failure, or fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    /// A threshold has neither an override nor a descriptor default.
    #[error("rule '{rule_id}': no value configured for threshold '{name}'")]
    Configuration { rule_id: String, name: String },

    /// The bundle holds fewer daily summaries than the rule requires.
    #[error("rule '{rule_id}': {available} daily summaries available, {required} required")]
    InsufficientData {
        rule_id: String,
        available: usize,
        required: usize,
    },

    /// A rule id was registered twice.
    #[error("rule '{0}' is already registered")]
    DuplicateRule(String),

    /// A rule failed unexpectedly during evaluation.
    #[error("rule '{rule_id}' failed: {message}")]
    RuleExecution { rule_id: String, message: String },

    /// The bundle handed to a rule could not be interpreted.
    #[error("malformed input bundle: {0}")]
    MalformedBundle(String),

    /// The external CGM source failed for a patient.
    #[error("data source error for patient '{patient_id}' ({start}..={end}): {message}")]
    DataSource {
        patient_id: String,
        start: NaiveDate,
        end: NaiveDate,
        message: String,
    },

    /// A rule filter named an id that is not registered.
    #[error("unknown rule '{0}'")]
    UnknownRule(String),

    /// A rule module's factory failed or panicked during discovery.
    #[error("rule module '{module}' failed to load: {message}")]
    ModuleLoad { module: String, message: String },

    /// Pattern settings could not be read or parsed.
    #[error("settings error: {0}")]
    Settings(String),
}

impl PatternError {
    /// True for the "window too short" signal, which callers treat as a skip.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, PatternError::InsufficientData { .. })
    }
}

pub type Result<T> = std::result::Result<T, PatternError>;
