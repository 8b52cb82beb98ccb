//! Node model - one step of the process graph with completion bookkeeping.

use std::collections::HashMap;

use crate::preset::StepSpec;
use crate::quota::{QuotaBounds, QuotaConfig};

/// Step number reserved for the synthetic Idle node
pub const IDLE_STEP_NUMBER: u32 = 0;

/// Fixed quota of the Idle node, in seconds; large enough that Idle never
/// really completes
pub const IDLE_QUOTA: f64 = 1000.0;

/// Action label that marks a handling (pure transfer) step
pub const TRANSFER_ACTION: &str = "transfer";

/// A node in the process graph.
///
/// Carries the step's identity and quota plus the mutable tracking state:
/// the per-cycle probability, the cumulative quota-normalized visit
/// probability, and the per-cycle first-allocation map.
#[derive(Debug, Clone)]
pub struct Node {
    number: u32,
    name: String,
    real_quota: f64,
    actions: Vec<String>,
    parents: Vec<u32>,
    probability: f64,
    visit_probability: f64,
    first_allocation: HashMap<String, f64>,
}

impl Node {
    /// Build a node from its preset specification.
    pub fn from_spec(spec: &StepSpec) -> Self {
        Self {
            number: spec.number,
            name: spec.name.clone(),
            real_quota: spec.real_quota,
            actions: spec.actions.clone(),
            parents: spec.parents.clone(),
            probability: 0.0,
            visit_probability: 0.0,
            first_allocation: HashMap::new(),
        }
    }

    /// Build the synthetic Idle node.
    pub fn idle() -> Self {
        Self {
            number: IDLE_STEP_NUMBER,
            name: "Idle".to_string(),
            real_quota: IDLE_QUOTA,
            actions: Vec::new(),
            parents: Vec::new(),
            probability: 0.0,
            visit_probability: 0.0,
            first_allocation: HashMap::new(),
        }
    }

    /// Step number.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Step name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nominal quota configured on the step itself.
    pub fn real_quota(&self) -> f64 {
        self.real_quota
    }

    /// Parent step numbers.
    pub fn parents(&self) -> &[u32] {
        &self.parents
    }

    /// This cycle's probability mass.
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Cumulative quota-normalized completion mass; may exceed 1.
    pub fn real_c(&self) -> f64 {
        self.visit_probability
    }

    /// Completion ratio clamped to [0, 1].
    pub fn c(&self) -> f64 {
        self.visit_probability.min(1.0)
    }

    /// Per-cycle allocation map, keyed by observation label.
    pub fn first_allocation(&self) -> &HashMap<String, f64> {
        &self.first_allocation
    }

    /// Whether this is the synthetic Idle node.
    pub fn is_idle(&self) -> bool {
        self.name.eq_ignore_ascii_case("idle")
    }

    /// Whether this step only mediates transfer/handoff; handling steps
    /// never count toward externally visible progress.
    pub fn is_handling(&self) -> bool {
        self.actions.iter().any(|a| a == TRANSFER_ACTION)
    }

    /// Whether any of the node's action strings matches the label exactly
    /// (case-insensitive), as a prefix, or as a suffix.
    pub fn can_receive_action(&self, label: &str) -> bool {
        self.actions
            .iter()
            .any(|a| a.eq_ignore_ascii_case(label) || a.starts_with(label) || a.ends_with(label))
    }

    /// Resolve this node's quota triple. Idle uses its fixed quota for the
    /// nominal value and both boundaries, bypassing configuration.
    pub fn bounds(&self, quota: &QuotaConfig) -> QuotaBounds {
        if self.is_idle() {
            return QuotaBounds {
                nominal: IDLE_QUOTA,
                lower: IDLE_QUOTA,
                upper: IDLE_QUOTA,
            };
        }
        quota.resolve(&self.name, self.real_quota)
    }

    /// Accumulated elapsed work time in seconds.
    pub fn elapsed(&self, quota: &QuotaConfig) -> f64 {
        self.visit_probability * self.bounds(quota).nominal
    }

    /// Whether the step has consumed at least its lower boundary.
    pub fn is_done(&self, quota: &QuotaConfig) -> bool {
        let bounds = self.bounds(quota);
        self.real_c() * bounds.nominal >= bounds.lower
    }

    /// Whether the step has consumed at least its upper boundary.
    pub fn is_timeout(&self, quota: &QuotaConfig) -> bool {
        let bounds = self.bounds(quota);
        self.real_c() * bounds.nominal >= bounds.upper
    }

    /// Timeout overshoot: completion mass beyond the full quota once the
    /// upper boundary has been crossed.
    pub fn d(&self, quota: &QuotaConfig) -> f64 {
        if self.is_timeout(quota) {
            (self.visit_probability - 1.0).max(0.0)
        } else {
            0.0
        }
    }

    /// Set this cycle's probability.
    pub fn set_probability(&mut self, probability: f64) {
        self.probability = probability;
    }

    /// Add to this cycle's probability.
    pub fn add_probability(&mut self, probability: f64) {
        self.probability += probability;
    }

    /// Record an allocation share for `label` this cycle.
    pub fn add_first_allocation(&mut self, label: &str, share: f64) {
        self.first_allocation.insert(label.to_string(), share);
    }

    /// Convert this cycle's probability held over `w` elapsed seconds into
    /// incremental visit probability.
    pub fn apply_time(&mut self, w: f64, quota: &QuotaConfig) {
        self.visit_probability += self.probability * w.max(0.0) / self.bounds(quota).nominal;
    }

    /// Reset the per-cycle state, keeping the visit probability.
    pub fn reset_cycle(&mut self) {
        self.probability = 0.0;
        self.first_allocation.clear();
    }

    /// Reset all state, including the visit probability.
    pub fn clear(&mut self) {
        self.probability = 0.0;
        self.visit_probability = 0.0;
        self.first_allocation.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::QuotaMode;

    fn offset_config() -> QuotaConfig {
        QuotaConfig {
            mode: QuotaMode::Offset,
            entries: Vec::new(),
        }
    }

    #[test]
    fn test_can_receive_action_exact_prefix_suffix() {
        let spec = StepSpec::new(1, "screw panel", 10.0);
        let node = Node::from_spec(&spec);
        assert!(node.can_receive_action("screw panel"));
        assert!(node.can_receive_action("SCREW PANEL"));
        assert!(node.can_receive_action("screw"));
        assert!(node.can_receive_action("panel"));
        assert!(!node.can_receive_action("bolt"));
    }

    #[test]
    fn test_apply_time_accumulates_against_quota() {
        let spec = StepSpec::new(1, "a", 10.0);
        let mut node = Node::from_spec(&spec);
        let config = offset_config();
        node.set_probability(1.0);
        node.apply_time(1.0, &config);
        assert!((node.real_c() - 0.1).abs() < 1e-9);
        // Negative elapsed weights contribute nothing.
        node.apply_time(-5.0, &config);
        assert!((node.real_c() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_c_is_clamped_real_c_is_not() {
        let spec = StepSpec::new(1, "a", 1.0);
        let mut node = Node::from_spec(&spec);
        let config = offset_config();
        node.set_probability(1.0);
        for _ in 0..3 {
            node.apply_time(1.0, &config);
        }
        assert!(node.real_c() > 1.0);
        assert_eq!(node.c(), 1.0);
    }

    #[test]
    fn test_done_and_timeout_thresholds() {
        let spec = StepSpec::new(1, "a", 10.0);
        let mut node = Node::from_spec(&spec);
        let config = offset_config();
        assert!(!node.is_done(&config));
        node.set_probability(1.0);
        for _ in 0..4 {
            node.apply_time(1.0, &config);
        }
        // visit 0.4 * 10s quota reaches the 4s lower boundary
        assert!(node.is_done(&config));
        assert!(!node.is_timeout(&config));
        for _ in 0..12 {
            node.apply_time(1.0, &config);
        }
        // visit 1.6 reaches the 16s upper boundary; overshoot is 0.6
        assert!(node.is_timeout(&config));
        assert!((node.d(&config) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_handling_node_is_transfer_only() {
        let spec = StepSpec::new(3, "handoff", 2.0).with_actions(["transfer"]);
        let node = Node::from_spec(&spec);
        assert!(node.is_handling());
        let plain = Node::from_spec(&StepSpec::new(1, "a", 1.0));
        assert!(!plain.is_handling());
    }

    #[test]
    fn test_idle_uses_fixed_bounds() {
        let idle = Node::idle();
        let config = offset_config();
        let bounds = idle.bounds(&config);
        assert_eq!(bounds.nominal, IDLE_QUOTA);
        assert_eq!(bounds.lower, IDLE_QUOTA);
        assert_eq!(bounds.upper, IDLE_QUOTA);
    }
}
