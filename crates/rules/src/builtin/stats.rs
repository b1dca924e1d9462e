//! Window-level statistics pooled from daily summaries.

use std::sync::Arc;

use cgm_core::{DailySummary, PatternError, Result};

/// Mean, population standard deviation and CV across several days,
/// weighted by each day's reading count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PooledStats {
    pub mean: f64,
    pub std: f64,
    pub cv: f64,
    pub readings: usize,
}

/// Pool per-day mean/std into window statistics. Days without readings
/// are ignored; returns `None` when no day has readings or the pooled
/// mean is not positive.
pub(crate) fn pooled_stats(days: &[Arc<DailySummary>]) -> Option<PooledStats> {
    let with_data: Vec<(f64, f64, f64)> = days
        .iter()
        .filter_map(|s| match (s.mean_glucose, s.std_glucose) {
            (Some(mean), Some(std)) if s.total_readings > 0 => {
                Some((s.total_readings as f64, mean, std))
            }
            _ => None,
        })
        .collect();

    let n: f64 = with_data.iter().map(|(n, _, _)| n).sum();
    if n == 0.0 {
        return None;
    }
    let mean = with_data.iter().map(|(k, m, _)| k * m).sum::<f64>() / n;
    let variance = with_data
        .iter()
        .map(|(k, m, s)| k * (s * s + (m - mean) * (m - mean)))
        .sum::<f64>()
        / n;
    if mean <= 0.0 {
        return None;
    }
    let std = variance.max(0.0).sqrt();
    Some(PooledStats {
        mean,
        std,
        cv: std / mean,
        readings: n as usize,
    })
}

/// Reading-weighted average of a per-day fraction.
pub(crate) fn pooled_fraction(
    days: &[Arc<DailySummary>],
    field: impl Fn(&DailySummary) -> f64,
) -> Option<f64> {
    let n: usize = days.iter().map(|s| s.total_readings).sum();
    if n == 0 {
        return None;
    }
    let weighted: f64 = days
        .iter()
        .map(|s| field(s) * s.total_readings as f64)
        .sum();
    Some(weighted / n as f64)
}

/// Days at or above the coverage threshold.
pub(crate) fn covered_days(days: &[Arc<DailySummary>], min_coverage: f64) -> Vec<Arc<DailySummary>> {
    days.iter()
        .filter(|s| s.has_readings() && s.coverage_ratio >= min_coverage)
        .cloned()
        .collect()
}

/// `InsufficientData` unless at least `required` days remain after
/// coverage filtering.
pub(crate) fn require_days(rule_id: &str, available: usize, required: usize) -> Result<()> {
    if available < required {
        return Err(PatternError::InsufficientData {
            rule_id: rule_id.to_string(),
            available,
            required,
        });
    }
    Ok(())
}
