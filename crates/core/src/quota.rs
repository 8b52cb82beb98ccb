//! Quota configuration - per-step timing thresholds and mode selection.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::preset::Preset;

/// Default ratio of the lower boundary to the nominal quota
pub const DEFAULT_LOWER_RATIO: f64 = 0.4;

/// Default ratio of the upper boundary to the nominal quota
pub const DEFAULT_UPPER_RATIO: f64 = 1.6;

/// Nominal quotas below this are treated as implausible and replaced by
/// the boundary midpoint
pub const MIN_PLAUSIBLE_QUOTA: f64 = 0.01;

/// Quota tracking mode for a preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaMode {
    /// Nominal quotas with boundaries derived from offset ratios
    Offset,
    /// Boundaries supplied directly from running statistics
    Confidence,
    /// No real-time tracking; sessions are segmented offline
    Disabled,
}

/// One per-step quota entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum QuotaEntry {
    /// Offset-mode entry: explicit nominal quota, boundaries optional.
    Offset {
        /// Step name
        step: String,
        /// Nominal duration in seconds
        quota: f64,
        /// Lower boundary; derived from [`DEFAULT_LOWER_RATIO`] when absent
        #[serde(default)]
        lower: Option<f64>,
        /// Upper boundary; derived from [`DEFAULT_UPPER_RATIO`] when absent
        #[serde(default)]
        upper: Option<f64>,
    },
    /// Confidence-mode entry: boundaries from statistics, average optional.
    Confidence {
        /// Step name
        step: String,
        /// Observed average duration, if any
        #[serde(default)]
        average: Option<f64>,
        /// Lower boundary
        lower: f64,
        /// Upper boundary
        upper: f64,
    },
}

impl QuotaEntry {
    /// The step name this entry applies to.
    pub fn step(&self) -> &str {
        match self {
            QuotaEntry::Offset { step, .. } | QuotaEntry::Confidence { step, .. } => step,
        }
    }

    fn bounds(&self) -> QuotaBounds {
        match self {
            QuotaEntry::Offset {
                quota,
                lower,
                upper,
                ..
            } => {
                let lower = lower.unwrap_or(DEFAULT_LOWER_RATIO * quota);
                let upper = upper.unwrap_or(DEFAULT_UPPER_RATIO * quota);
                let nominal = if *quota < MIN_PLAUSIBLE_QUOTA {
                    (lower + upper) / 2.0
                } else {
                    *quota
                };
                QuotaBounds {
                    nominal,
                    lower,
                    upper,
                }
            }
            QuotaEntry::Confidence {
                average,
                lower,
                upper,
                ..
            } => {
                let nominal = match average {
                    Some(avg) if *avg >= MIN_PLAUSIBLE_QUOTA => *avg,
                    _ => (lower + upper) / 2.0,
                };
                QuotaBounds {
                    nominal,
                    lower: *lower,
                    upper: *upper,
                }
            }
        }
    }
}

/// Resolved `(nominal, lower, upper)` triple for one step, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaBounds {
    /// Nominal duration
    pub nominal: f64,

    /// Completion threshold
    pub lower: f64,

    /// Overrun threshold
    pub upper: f64,
}

/// Quota configuration for one preset.
///
/// All durations are seconds; unit hygiene is the supplier's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Tracking mode
    pub mode: QuotaMode,

    /// Per-step entries
    #[serde(default)]
    pub entries: Vec<QuotaEntry>,
}

impl QuotaConfig {
    /// Build the default offset-mode configuration for a preset.
    pub fn defaults_for(preset: &Preset) -> Self {
        let entries = preset
            .steps
            .iter()
            .map(|step| QuotaEntry::Offset {
                step: step.name.clone(),
                quota: step.real_quota,
                lower: Some(DEFAULT_LOWER_RATIO * step.real_quota),
                upper: Some(DEFAULT_UPPER_RATIO * step.real_quota),
            })
            .collect();
        Self {
            mode: QuotaMode::Offset,
            entries,
        }
    }

    /// Whether real-time tracking is disabled for this preset.
    pub fn is_disabled(&self) -> bool {
        self.mode == QuotaMode::Disabled
    }

    /// Resolve the quota triple for a step.
    ///
    /// Never fails: a missing entry synthesizes an offset-mode default
    /// from the step's own nominal quota. In disabled mode the raw quota
    /// is returned with no boundary semantics.
    pub fn resolve(&self, step_name: &str, real_quota: f64) -> QuotaBounds {
        if self.is_disabled() {
            return QuotaBounds {
                nominal: real_quota,
                lower: real_quota,
                upper: real_quota,
            };
        }
        if let Some(entry) = self.entries.iter().find(|e| e.step() == step_name) {
            return entry.bounds();
        }
        debug!(step = step_name, "no quota entry, synthesizing offset default");
        QuotaBounds {
            nominal: real_quota,
            lower: DEFAULT_LOWER_RATIO * real_quota,
            upper: DEFAULT_UPPER_RATIO * real_quota,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::StepSpec;

    #[test]
    fn test_offset_entry_derives_boundaries() {
        let config = QuotaConfig {
            mode: QuotaMode::Offset,
            entries: vec![QuotaEntry::Offset {
                step: "weld".to_string(),
                quota: 10.0,
                lower: None,
                upper: None,
            }],
        };
        let bounds = config.resolve("weld", 10.0);
        assert_eq!(bounds.nominal, 10.0);
        assert_eq!(bounds.lower, 4.0);
        assert_eq!(bounds.upper, 16.0);
    }

    #[test]
    fn test_implausible_quota_falls_back_to_midpoint() {
        let config = QuotaConfig {
            mode: QuotaMode::Offset,
            entries: vec![QuotaEntry::Offset {
                step: "weld".to_string(),
                quota: 0.0,
                lower: Some(4.0),
                upper: Some(16.0),
            }],
        };
        let bounds = config.resolve("weld", 10.0);
        assert_eq!(bounds.nominal, 10.0);
    }

    #[test]
    fn test_confidence_entry_midpoint_when_average_missing() {
        let config = QuotaConfig {
            mode: QuotaMode::Confidence,
            entries: vec![QuotaEntry::Confidence {
                step: "weld".to_string(),
                average: None,
                lower: 6.0,
                upper: 14.0,
            }],
        };
        let bounds = config.resolve("weld", 10.0);
        assert_eq!(bounds.nominal, 10.0);
        assert_eq!(bounds.lower, 6.0);
        assert_eq!(bounds.upper, 14.0);
    }

    #[test]
    fn test_missing_entry_synthesizes_default() {
        let config = QuotaConfig {
            mode: QuotaMode::Offset,
            entries: Vec::new(),
        };
        let bounds = config.resolve("anything", 5.0);
        assert_eq!(bounds.nominal, 5.0);
        assert_eq!(bounds.lower, 2.0);
        assert_eq!(bounds.upper, 8.0);
    }

    #[test]
    fn test_disabled_mode_returns_raw_quota() {
        let config = QuotaConfig {
            mode: QuotaMode::Disabled,
            entries: Vec::new(),
        };
        let bounds = config.resolve("weld", 7.0);
        assert_eq!(bounds.nominal, 7.0);
        assert_eq!(bounds.lower, 7.0);
        assert_eq!(bounds.upper, 7.0);
    }

    #[test]
    fn test_defaults_for_preset_covers_every_step() {
        let mut preset = Preset::new("demo");
        preset.steps.push(StepSpec::new(1, "a", 10.0));
        preset.steps.push(StepSpec::new(2, "b", 20.0));
        let config = QuotaConfig::defaults_for(&preset);
        assert_eq!(config.mode, QuotaMode::Offset);
        assert_eq!(config.entries.len(), 2);
        assert_eq!(config.resolve("b", 20.0).upper, 32.0);
    }
}
