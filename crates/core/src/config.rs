use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub data: DataConfig,
    pub window: WindowConfig,
    pub summary: SummaryConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CGM_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CGM_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            data: DataConfig::from_env_profiled(p),
            window: WindowConfig::from_env_profiled(p),
            summary: SummaryConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  data:     data_dir={}, settings={}",
            self.data.data_dir.display(),
            self.data
                .settings_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".to_string())
        );
        tracing::info!(
            "  window:   lookback_days={}, workers={}",
            self.window.lookback_days,
            self.window.workers
        );
        tracing::info!(
            "  summary:  high={} low={} interval={}min",
            self.summary.high_threshold,
            self.summary.low_threshold,
            self.summary.reading_interval_minutes
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            data: DataConfig::default(),
            window: WindowConfig::default(),
            summary: SummaryConfig::default(),
        }
    }
}

// ── Data ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding one `<patient_id>.json` reading file per patient.
    pub data_dir: PathBuf,
    /// Optional YAML file with thresholds and patient metadata.
    pub settings_file: Option<PathBuf>,
}

impl DataConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "CGM_DATA_DIR", "data/cgm")),
            settings_file: profiled_env_opt(p, "CGM_SETTINGS_FILE").map(PathBuf::from),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/cgm"),
            settings_file: None,
        }
    }
}

// ── Sliding window ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Days of history (including the analysis date) visible to rules.
    pub lookback_days: usize,
    /// Patient worker threads. 0 = one per CPU.
    pub workers: usize,
}

impl WindowConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            lookback_days: profiled_env_parse(p, "CGM_LOOKBACK_DAYS", 14usize).max(1),
            workers: profiled_env_parse(p, "CGM_WORKERS", 1usize),
        }
    }

    /// Worker count with 0 resolved to the available parallelism.
    pub fn resolved_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.workers
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            lookback_days: 14,
            workers: 1,
        }
    }
}

// ── Daily summaries ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Readings above this are "high" (mg/dL).
    pub high_threshold: f64,
    /// Readings below this are "low" (mg/dL).
    pub low_threshold: f64,
    /// Minutes credited to each reading.
    pub reading_interval_minutes: f64,
}

impl SummaryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            high_threshold: profiled_env_parse(p, "CGM_HIGH_THRESHOLD", 180.0),
            low_threshold: profiled_env_parse(p, "CGM_LOW_THRESHOLD", 70.0),
            reading_interval_minutes: profiled_env_parse(p, "CGM_READING_INTERVAL_MINUTES", 5.0),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            high_threshold: 180.0,
            low_threshold: 70.0,
            reading_interval_minutes: 5.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_prefix_takes_precedence() {
        env::set_var("CGMTEST_CGM_LOOKBACK_DAYS", "21");
        env::set_var("CGM_WORKERS", "3");
        let cfg = Config::for_profile("cgmtest");
        assert_eq!(cfg.profile, "CGMTEST");
        assert_eq!(cfg.window.lookback_days, 21);
        assert_eq!(cfg.window.workers, 3);
        env::remove_var("CGMTEST_CGM_LOOKBACK_DAYS");
        env::remove_var("CGM_WORKERS");
    }

    #[test]
    fn zero_workers_resolves_to_cpu_count() {
        let w = WindowConfig { lookback_days: 7, workers: 0 };
        assert!(w.resolved_workers() >= 1);
    }

    #[test]
    fn default_profile_label() {
        assert_eq!(Config::default().profile_label(), "default");
    }
}
