//! Overnight rules that need raw readings, not just daily summaries.

use std::sync::Arc;

use chrono::Timelike;
use cgm_core::{
    PatternContext, PatternDetection, PatternInputBundle, PatternStatus, Reading, Result,
    RuleDescriptor,
};

use super::stats::{covered_days, require_days};
use crate::rule::PatternRule;

pub fn rules() -> Result<Vec<Arc<dyn PatternRule>>> {
    Ok(vec![Arc::new(NocturnalHypoglycemia::new())])
}

/// Lows during the sleep window on enough nights.
///
/// A night qualifies with at least `min_minutes_low` minutes under
/// `low_threshold`, or any reading under `critical_threshold`.
pub struct NocturnalHypoglycemia {
    descriptor: RuleDescriptor,
}

/// What one night's readings showed.
struct NightLows {
    minutes_low: f64,
    minimum: f64,
}

impl NocturnalHypoglycemia {
    pub const ID: &'static str = "nocturnal_hypoglycemia";

    pub fn new() -> Self {
        Self {
            descriptor: RuleDescriptor::new(Self::ID, "Nocturnal Hypoglycemia (00:00-06:00)")
                .description(">= 15 minutes < 70 mg/dL (or any < 54) on >= 2 nights")
                .version("1.3.0")
                .min_window_days(7)
                .default_threshold("analysis_window_days", 14.0)
                .default_threshold("minimum_day_coverage", 0.7)
                .default_threshold("low_threshold", 70.0)
                .default_threshold("critical_threshold", 54.0)
                .default_threshold("min_minutes_low", 15.0)
                .default_threshold("nights_required", 2.0)
                .default_threshold("night_start_hour", 0.0)
                .default_threshold("night_end_hour", 6.0)
                .default_threshold("reading_minutes", 5.0)
                .diagnosis_context("T2DM/General")
                .tags(&["micro", "safety"]),
        }
    }

    fn night_lows(
        readings: &[Reading],
        start_hour: f64,
        end_hour: f64,
        low: f64,
        step: f64,
    ) -> Option<NightLows> {
        let overnight: Vec<&Reading> = readings
            .iter()
            .filter(|r| {
                let t = r.timestamp.time();
                let hour = t.hour() as f64 + t.minute() as f64 / 60.0;
                hour >= start_hour && hour < end_hour
            })
            .collect();
        if overnight.is_empty() {
            return None;
        }
        let below = overnight.iter().filter(|r| r.glucose_mg_dl < low).count();
        let minimum = overnight
            .iter()
            .map(|r| r.glucose_mg_dl)
            .fold(f64::INFINITY, f64::min);
        Some(NightLows {
            minutes_low: below as f64 * step,
            minimum,
        })
    }
}

impl Default for NocturnalHypoglycemia {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternRule for NocturnalHypoglycemia {
    fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    fn evaluate(
        &self,
        bundle: &PatternInputBundle,
        context: &PatternContext,
    ) -> Result<Option<PatternDetection>> {
        self.ensure_validation_window(bundle)?;

        let coverage = self.resolved_threshold(context, "minimum_day_coverage")?;
        let low = self.resolved_threshold(context, "low_threshold")?;
        let critical = self.resolved_threshold(context, "critical_threshold")?;
        let min_minutes = self.resolved_threshold(context, "min_minutes_low")?;
        let nights_required = self.resolved_count(context, "nights_required")?.max(1);
        let start_hour = self.resolved_threshold(context, "night_start_hour")?;
        let end_hour = self.resolved_threshold(context, "night_end_hour")?;
        let step = self.resolved_threshold(context, "reading_minutes")?;
        let window = self
            .resolved_count(context, "analysis_window_days")?
            .max(self.descriptor.min_window_days);

        let days = covered_days(bundle.recent_summaries(window), coverage);
        require_days(Self::ID, days.len(), self.descriptor.min_window_days)?;

        let mut qualifying = Vec::new();
        for day in &days {
            let Some(night) =
                Self::night_lows(bundle.readings_on(day.date), start_hour, end_hour, low, step)
            else {
                continue;
            };
            if night.minutes_low >= min_minutes || night.minimum < critical {
                qualifying.push((day.date, night));
            }
        }

        let status = if qualifying.len() >= nights_required {
            PatternStatus::Triggered
        } else {
            PatternStatus::NotTriggered
        };

        let mut detection = self
            .detection(context, status)
            .metric("overnight_low_nights", qualifying.len() as f64)
            .metric("nights_required", nights_required as f64)
            .metric("days_considered", days.len() as f64)
            .confidence(qualifying.len() as f64 / nights_required as f64);
        for (date, night) in qualifying.iter().take(nights_required.max(3)) {
            detection = detection.evidence(format!(
                "{}: {:.0} min below {:.0} mg/dL, minimum {:.0} mg/dL",
                date, night.minutes_low, low, night.minimum
            ));
        }
        Ok(Some(detection))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};
    use cgm_core::DailySummary;

    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    /// A full day at 110 mg/dL with `overnight_low` readings at `low_value` from 02:00.
    fn day_readings(d: u32, overnight_low: usize, low_value: f64) -> Vec<Reading> {
        let start = date(d).and_hms_opt(0, 0, 0).unwrap();
        (0..288)
            .map(|i| {
                let ts = start + Duration::minutes(5 * i as i64);
                let in_low = i >= 24 && i < 24 + overnight_low;
                Reading::new(ts, if in_low { low_value } else { 110.0 })
            })
            .collect()
    }

    fn bundle(lows: &[(u32, usize, f64)]) -> PatternInputBundle {
        let mut readings = Vec::new();
        let mut summaries = Vec::new();
        for d in 1..=7 {
            let (count, value) = lows
                .iter()
                .find(|(day, _, _)| *day == d)
                .map(|(_, c, v)| (*c, *v))
                .unwrap_or((0, 110.0));
            readings.extend(day_readings(d, count, value));
            let mut s = DailySummary::empty("p", date(d));
            s.total_readings = 288;
            s.coverage_ratio = 1.0;
            s.mean_glucose = Some(110.0);
            s.std_glucose = Some(5.0);
            summaries.push(Arc::new(s));
        }
        PatternInputBundle::new("p", date(1), date(7), readings, summaries)
    }

    fn ctx() -> PatternContext {
        PatternContext::new("p", date(7))
    }

    #[test]
    fn two_long_lows_trigger() {
        let rule = NocturnalHypoglycemia::new();
        // 4 readings * 5 min = 20 min below 70
        let d = rule
            .evaluate(&bundle(&[(2, 4, 65.0), (5, 4, 65.0)]), &ctx())
            .unwrap()
            .unwrap();
        assert_eq!(d.status, PatternStatus::Triggered);
        assert_eq!(d.metrics["overnight_low_nights"], 2.0);
        assert_eq!(d.evidence.len(), 2);
    }

    #[test]
    fn short_mild_lows_do_not_count() {
        let rule = NocturnalHypoglycemia::new();
        // 2 readings = 10 min, above the critical threshold
        let d = rule
            .evaluate(&bundle(&[(2, 2, 65.0), (5, 2, 65.0)]), &ctx())
            .unwrap()
            .unwrap();
        assert_eq!(d.status, PatternStatus::NotTriggered);
    }

    #[test]
    fn brief_critical_lows_count() {
        let rule = NocturnalHypoglycemia::new();
        let d = rule
            .evaluate(&bundle(&[(2, 1, 50.0), (3, 1, 50.0)]), &ctx())
            .unwrap()
            .unwrap();
        assert_eq!(d.status, PatternStatus::Triggered);
    }

    #[test]
    fn daytime_lows_are_ignored() {
        let rule = NocturnalHypoglycemia::new();
        let ctx = ctx()
            .with_rule_threshold(NocturnalHypoglycemia::ID, "night_start_hour", 3.0);
        // lows at 02:00 fall outside a 03:00-06:00 window
        let d = rule
            .evaluate(&bundle(&[(2, 4, 65.0), (5, 4, 65.0)]), &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(d.status, PatternStatus::NotTriggered);
    }
}
