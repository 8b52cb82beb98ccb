//! Process graph - the step dependency DAG for one session.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::node::Node;
use crate::preset::Preset;
use crate::quota::QuotaConfig;

/// Stable reference to a step, used in timelines and query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRef {
    /// Step number
    pub number: u32,

    /// Step name
    pub name: String,
}

impl StepRef {
    fn of(node: &Node) -> Self {
        Self {
            number: node.number(),
            name: node.name().to_string(),
        }
    }
}

/// The dependency DAG of one session.
///
/// The node set is fixed for the graph's lifetime; only per-node tracking
/// state mutates. The graph owns the node-to-step-record lookup, so
/// queries return [`StepRef`]s without any shared registry.
#[derive(Debug, Clone)]
pub struct ProcessGraph {
    nodes: Vec<Node>,
    idle: Node,
}

impl ProcessGraph {
    /// Build the graph for a preset. Step numbering is taken from the
    /// preset and must not collide with the Idle number 0.
    pub fn from_preset(preset: &Preset) -> Self {
        Self {
            nodes: preset.steps.iter().map(Node::from_spec).collect(),
            idle: Node::idle(),
        }
    }

    /// All process nodes, excluding Idle.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Mutable access to all process nodes, excluding Idle.
    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// The synthetic Idle node.
    pub fn idle(&self) -> &Node {
        &self.idle
    }

    /// Mutable access to the Idle node.
    pub fn idle_mut(&mut self) -> &mut Node {
        &mut self.idle
    }

    /// Look up a node by step number.
    pub fn node(&self, number: u32) -> Option<&Node> {
        self.nodes.iter().find(|n| n.number() == number)
    }

    /// Look up a node mutably by step number.
    pub fn node_mut(&mut self, number: u32) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.number() == number)
    }

    /// Resolve a step record by number; Idle resolves too.
    pub fn step(&self, number: u32) -> Result<StepRef> {
        if number == self.idle.number() {
            return Ok(StepRef::of(&self.idle));
        }
        self.node(number)
            .map(StepRef::of)
            .ok_or(CoreError::StepNotFound(number))
    }

    /// Numbers of all nodes that can receive the given action label.
    pub fn nodes_accepting(&self, label: &str) -> Vec<u32> {
        self.nodes
            .iter()
            .filter(|n| n.can_receive_action(label))
            .map(|n| n.number())
            .collect()
    }

    /// Whether `ancestor` is a strict ancestor of `of` in the DAG.
    pub fn is_strict_ancestor(&self, ancestor: u32, of: u32) -> bool {
        if ancestor == of {
            return false;
        }
        let mut visited = HashSet::new();
        let mut stack: Vec<u32> = self
            .node(of)
            .map(|n| n.parents().to_vec())
            .unwrap_or_default();
        while let Some(parent) = stack.pop() {
            if !visited.insert(parent) {
                continue;
            }
            if parent == ancestor {
                return true;
            }
            if let Some(node) = self.node(parent) {
                stack.extend_from_slice(node.parents());
            }
        }
        false
    }

    /// Parent-readiness signal: product over parents of 1 when the parent
    /// is done, else its completion ratio. 1 for roots and Idle.
    pub fn f(&self, number: u32, quota: &QuotaConfig) -> f64 {
        let Some(node) = self.node(number) else {
            return 1.0;
        };
        node.parents()
            .iter()
            .filter_map(|p| self.node(*p))
            .map(|p| if p.is_done(quota) { 1.0 } else { p.c() })
            .product()
    }

    /// Error signal: completion accrued while parents were not ready.
    pub fn e(&self, number: u32, quota: &QuotaConfig) -> f64 {
        let Some(node) = self.node(number) else {
            return 0.0;
        };
        node.c() * (1.0 - self.f(number, quota))
    }

    /// The step with the highest probability this cycle, Idle as fallback.
    pub fn most_probable(&self) -> StepRef {
        let mut best = &self.idle;
        for node in &self.nodes {
            if node.probability() > best.probability() {
                best = node;
            }
        }
        StepRef::of(best)
    }

    /// Reset per-cycle state on every node, keeping visit probabilities.
    pub fn reset_cycle(&mut self) {
        self.idle.reset_cycle();
        for node in &mut self.nodes {
            node.reset_cycle();
        }
    }

    /// Reset all tracking state, including visit probabilities.
    pub fn clear(&mut self) {
        self.idle.clear();
        for node in &mut self.nodes {
            node.clear();
        }
    }
}
