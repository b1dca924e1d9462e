use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;
use cgm_core::Config;

/// Run CGM pattern rules over a list of patients.
///
/// Reads one `<patient_id>.json` reading file per patient from the data
/// directory, evaluates every analysis date in `--start..=--end`, and
/// writes a JSON report keyed by patient.
#[derive(Parser, Debug)]
#[command(name = "cgm-patterns", about = "Detect CGM patterns over a date range")]
pub struct CliArgs {
    /// File with one patient id per line (first comma-separated column)
    pub patients: Option<PathBuf>,

    /// First analysis date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last analysis date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Only run this rule id (repeatable, exact match)
    #[arg(long = "pattern")]
    pub patterns: Vec<String>,

    /// Skip a rule module by name (repeatable)
    #[arg(long = "disable-module")]
    pub disabled_modules: Vec<String>,

    /// Config profile; env keys are read as {PROFILE}_{KEY} first
    #[arg(long, env = "CGM_PROFILE")]
    pub profile: Option<String>,

    /// YAML file with thresholds and patient metadata
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Directory holding the patient reading files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Patient worker threads (0 = one per CPU)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Days of history visible to rules, including the analysis date
    #[arg(long)]
    pub lookback_days: Option<usize>,

    /// Write the report here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Print the registered rules and exit
    #[arg(long)]
    pub list_rules: bool,

    /// Include non-triggered detections in the report
    #[arg(long)]
    pub include_all: bool,
}

impl CliArgs {
    /// Environment config with command-line overrides applied.
    pub fn resolve_config(&self) -> Config {
        let mut config = match &self.profile {
            Some(profile) => Config::for_profile(profile),
            None => Config::from_env(),
        };
        if let Some(dir) = &self.data_dir {
            config.data.data_dir = dir.clone();
        }
        if let Some(path) = &self.settings {
            config.data.settings_file = Some(path.clone());
        }
        if let Some(workers) = self.workers {
            config.window.workers = workers;
        }
        if let Some(days) = self.lookback_days {
            config.window.lookback_days = days.max(1);
        }
        config
    }
}
