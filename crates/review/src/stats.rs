//! Per-step timing statistics across sessions.

use std::collections::HashMap;

use serde::Serialize;
use stepline_core::{Preset, QuotaConfig, SessionLog};

use crate::reconstruct::{dwell_of, raw_timeline};

/// Aggregated timing statistics for one step of a preset.
#[derive(Debug, Clone, Serialize)]
pub struct StepStats {
    /// Step name
    pub step_name: String,

    /// Mean dwell time in milliseconds
    pub average_ms: f64,

    /// Sample standard deviation of the dwell time in milliseconds
    pub std_dev_ms: f64,
}

/// Compute per-step dwell statistics across a preset's session logs.
///
/// Every reconstructed timeline entry contributes one dwell sample to its
/// step. Results are sorted by step name.
pub fn step_stats(logs: &[SessionLog], preset: &Preset, quota: &QuotaConfig) -> Vec<StepStats> {
    let mut durations: HashMap<String, Vec<i64>> = HashMap::new();
    for log in logs {
        let timeline = raw_timeline(log, preset, quota);
        for &ts in timeline.keys() {
            let step = &timeline[&ts];
            let dwell = dwell_of(&timeline, ts, log.duration_ms());
            durations.entry(step.name.clone()).or_default().push(dwell);
        }
    }

    let mut results: Vec<StepStats> = durations
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(step_name, values)| {
            let avg = average(&values);
            StepStats {
                step_name,
                average_ms: avg,
                std_dev_ms: std_dev(&values, avg),
            }
        })
        .collect();
    results.sort_by(|a, b| a.step_name.cmp(&b.step_name));
    results
}

fn average(values: &[i64]) -> f64 {
    values.iter().sum::<i64>() as f64 / values.len() as f64
}

fn std_dev(values: &[i64], avg: f64) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let sum_square: f64 = values
        .iter()
        .map(|&v| {
            let diff = v as f64 - avg;
            diff * diff
        })
        .sum();
    (sum_square / (values.len() - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stepline_core::{Observation, QuotaMode, SessionId, StepSpec};

    fn single_step_preset() -> Preset {
        let mut preset = Preset::new("single");
        preset.steps.push(StepSpec::new(1, "frame", 10.0));
        preset
    }

    fn log_with_batches(batches: &[(i64, f64)]) -> SessionLog {
        let start = chrono::Utc::now();
        let end = start + Duration::milliseconds(batches.last().map(|(ts, _)| *ts).unwrap_or(0));
        SessionLog {
            id: SessionId::new(),
            user: "tester".to_string(),
            preset_name: "single".to_string(),
            start_time: start,
            end_time: end,
            observations: batches
                .iter()
                .map(|(ts, conf)| (*ts, vec![Observation::new("frame", *conf)]))
                .collect(),
        }
    }

    #[test]
    fn test_stats_mean_and_deviation() {
        let preset = single_step_preset();
        let quota = QuotaConfig {
            mode: QuotaMode::Offset,
            entries: Vec::new(),
        };
        let batches: Vec<(i64, f64)> = (1..=10).map(|i| (i * 1000, 1.0)).collect();
        let logs = vec![log_with_batches(&batches)];

        let stats = step_stats(&logs, &preset, &quota);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].step_name, "frame");
        // Nine 1000ms dwells plus a final 0ms dwell at the session end.
        assert!((stats[0].average_ms - 900.0).abs() < 1e-9);
        assert!((stats[0].std_dev_ms - 100.0 * 10_f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_single_sample_has_zero_deviation() {
        let preset = single_step_preset();
        let quota = QuotaConfig {
            mode: QuotaMode::Offset,
            entries: Vec::new(),
        };
        let logs = vec![log_with_batches(&[(1000, 1.0)])];
        let stats = step_stats(&logs, &preset, &quota);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].std_dev_ms, 0.0);
    }
}
