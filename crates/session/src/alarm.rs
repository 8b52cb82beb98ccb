//! Alarm derivation from live graph state.

use serde::Serialize;
use stepline_core::{ProcessGraph, QuotaConfig};

/// Alarm severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A specific step is off track
    Error,
    /// Aggregated signal over handling steps
    Warning,
}

/// A user-facing alert derived from a step's error or timeout signal.
#[derive(Debug, Clone, Serialize)]
pub struct Alarm {
    /// Alert title
    pub message: String,

    /// Detailed description
    pub description: String,

    /// Signal strength as a rounded percentage
    pub percentage: i32,

    /// Alert severity
    pub severity: Severity,
}

/// Derive alarms from the graph's error and timeout signals.
///
/// Every non-handling step with a nonzero error signal (completion accrued
/// before its parents were ready) or timeout overshoot yields one alarm.
/// Handling steps are aggregated into a single warning per signal kind.
/// Returns nothing when quota tracking is disabled.
pub fn evaluate_alarms(graph: &ProcessGraph, quota: &QuotaConfig) -> Vec<Alarm> {
    if quota.is_disabled() {
        return Vec::new();
    }

    let mut alarms = Vec::new();
    let mut handling_error = 1.0;
    let mut handling_timeout = 1.0;

    for node in graph.nodes() {
        let error = graph.e(node.number(), quota);
        let timeout = node.d(quota);

        if node.is_handling() {
            handling_error *= 1.0 - error;
            handling_timeout *= 1.0 - timeout;
            continue;
        }

        if error != 0.0 {
            alarms.push(Alarm {
                message: format!("Error in step {}", node.number()),
                description: format!("Step ({}) may be done in wrong order.", node.name()),
                percentage: (error * 100.0).round() as i32,
                severity: Severity::Error,
            });
        }

        if timeout != 0.0 {
            alarms.push(Alarm {
                message: format!("Timeout in step {}", node.number()),
                description: format!("Step {} exceeded time limit.", node.name()),
                percentage: (timeout * 100.0).round() as i32,
                severity: Severity::Error,
            });
        }
    }

    let handling_error = 1.0 - handling_error;
    let handling_timeout = 1.0 - handling_timeout;

    if handling_error != 0.0 {
        alarms.push(Alarm {
            message: "Error in handling".to_string(),
            description: "Handling steps may be done in wrong order.".to_string(),
            percentage: (handling_error * 100.0).round() as i32,
            severity: Severity::Warning,
        });
    }

    if handling_timeout != 0.0 {
        alarms.push(Alarm {
            message: "Timeout in handling".to_string(),
            description: "Handling steps exceeded time limit.".to_string(),
            percentage: (handling_timeout * 100.0).round() as i32,
            severity: Severity::Warning,
        });
    }

    alarms
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepline_core::{Observation, Preset, QuotaMode, StepSpec};
    use stepline_engine::ProgressTracker;

    fn offset_config() -> QuotaConfig {
        QuotaConfig {
            mode: QuotaMode::Offset,
            entries: Vec::new(),
        }
    }

    /// Drive a two-step chain so the dependent step completes while its
    /// parent never starts.
    fn out_of_order_tracker() -> ProgressTracker {
        let mut preset = Preset::new("order");
        preset.steps.push(StepSpec::new(1, "first", 5.0));
        preset
            .steps
            .push(StepSpec::new(2, "second", 5.0).with_parents([1]));
        let mut tracker = ProgressTracker::new(stepline_core::ProcessGraph::from_preset(&preset));
        let config = offset_config();
        for ts in (1000..=5000).step_by(1000) {
            tracker.update(ts, &[Observation::new("second", 1.0)], &config);
        }
        tracker
    }

    #[test]
    fn test_out_of_order_step_raises_one_error_alarm() {
        let tracker = out_of_order_tracker();
        let config = offset_config();
        let graph = tracker.graph();

        // The dependent step is fully complete with an unready parent.
        assert_eq!(graph.node(2).unwrap().c(), 1.0);
        assert_eq!(graph.f(2, &config), 0.0);

        let alarms = evaluate_alarms(graph, &config);
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].severity, Severity::Error);
        let expected = (graph.e(2, &config) * 100.0).round() as i32;
        assert_eq!(alarms[0].percentage, expected);
        assert_eq!(expected, 100);
    }

    #[test]
    fn test_disabled_mode_emits_nothing() {
        let tracker = out_of_order_tracker();
        let disabled = QuotaConfig {
            mode: QuotaMode::Disabled,
            entries: Vec::new(),
        };
        assert!(evaluate_alarms(tracker.graph(), &disabled).is_empty());
    }

    #[test]
    fn test_handling_steps_aggregate_into_warning() {
        let mut preset = Preset::new("handling");
        preset.steps.push(StepSpec::new(1, "first", 5.0));
        preset.steps.push(
            StepSpec::new(2, "carry", 5.0)
                .with_actions(["transfer"])
                .with_parents([1]),
        );
        let mut tracker = ProgressTracker::new(stepline_core::ProcessGraph::from_preset(&preset));
        let config = offset_config();
        // Only the handling step sees activity, so it completes before its
        // parent is ready.
        for ts in (1000..=5000).step_by(1000) {
            tracker.update(ts, &[Observation::new("transfer", 1.0)], &config);
        }

        let alarms = evaluate_alarms(tracker.graph(), &config);
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].severity, Severity::Warning);
        assert_eq!(alarms[0].percentage, 100);
    }
}
