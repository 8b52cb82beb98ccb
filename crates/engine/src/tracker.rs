//! Online progress tracker - incremental probability propagation.

use std::collections::BTreeMap;

use stepline_core::{Observation, ProcessGraph, QuotaConfig, StepRef, TRANSFER_ACTION};
use tracing::{debug, info};

/// Elapsed-time deltas above this many seconds are rejected as clock jumps
pub const MAX_ELAPSED_SECS: f64 = 100_000.0;

/// Upper bound on redistribution passes per allocation entry
pub const REDISTRIBUTION_MAX_PASSES: usize = 5;

/// Redistribution stops once the remaining mass drops to this fraction
pub const REDISTRIBUTION_EPSILON: f64 = 0.01;

/// Residual mass below this is dropped instead of credited back
const RESIDUAL_FLOOR: f64 = 0.001;

/// Per-cycle probabilities at or below this snap to zero
const SNAP_ZERO: f64 = 0.01;

/// Real-time probability tracker for one session.
///
/// Owns the session's process graph and converts observation batches into
/// quota-normalized completion mass. Calls are synchronous and must be
/// serialized by the caller: one writer per session.
pub struct ProgressTracker {
    graph: ProcessGraph,
    last_update_ms: i64,
    observations: BTreeMap<i64, Vec<Observation>>,
}

impl ProgressTracker {
    /// Create a tracker over a freshly built graph.
    pub fn new(graph: ProcessGraph) -> Self {
        Self {
            graph,
            last_update_ms: 0,
            observations: BTreeMap::new(),
        }
    }

    /// The tracked graph.
    pub fn graph(&self) -> &ProcessGraph {
        &self.graph
    }

    /// Timestamp of the last accepted update, ms since session start.
    pub fn last_update_ms(&self) -> i64 {
        self.last_update_ms
    }

    /// Every observation batch recorded so far, keyed by ms since start.
    pub fn observations(&self) -> &BTreeMap<i64, Vec<Observation>> {
        &self.observations
    }

    /// The step with the highest probability this cycle, Idle as fallback.
    pub fn most_probable_state(&self) -> StepRef {
        self.graph.most_probable()
    }

    /// Record one observation batch and apply it to the graph.
    ///
    /// `timestamp_ms` is milliseconds since session start. In disabled
    /// quota mode the batch is recorded for offline segmentation but the
    /// real-time update is skipped.
    pub fn update(&mut self, timestamp_ms: i64, batch: &[Observation], quota: &QuotaConfig) {
        self.observations
            .entry(timestamp_ms)
            .or_default()
            .extend_from_slice(batch);
        self.apply(timestamp_ms, batch, quota);
    }

    /// Reset all state and replay recorded batches up to `till_ms`.
    pub fn rewind_to(&mut self, till_ms: i64, quota: &QuotaConfig) {
        info!(till_ms, batches = self.observations.len(), "rewinding tracker");
        self.graph.clear();
        self.last_update_ms = 0;
        if quota.is_disabled() {
            return;
        }
        let replay: Vec<(i64, Vec<Observation>)> = self
            .observations
            .range(..=till_ms)
            .map(|(ts, batch)| (*ts, batch.clone()))
            .collect();
        for (ts, batch) in replay {
            self.apply(ts, &batch, quota);
        }
    }

    fn apply(&mut self, timestamp_ms: i64, batch: &[Observation], quota: &QuotaConfig) {
        if quota.is_disabled() {
            debug!("quota disabled, skipping real-time update");
            return;
        }

        let w = (timestamp_ms - self.last_update_ms) as f64 / 1000.0;
        if w == 0.0 || w > MAX_ELAPSED_SECS {
            debug!(w, "rejecting update, elapsed weight out of range");
            return;
        }
        self.last_update_ms = timestamp_ms;

        self.graph.reset_cycle();

        let mut obs: Vec<Observation> = batch.to_vec();
        if obs.is_empty() {
            obs.push(Observation::new(TRANSFER_ACTION, 1.0));
        }
        obs.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some(combined) = cross_combine(&obs) {
            debug!(count = combined.len(), "cross-combined raw head predictions");
            obs = combined;
        }

        let sum: f64 = obs.iter().map(|o| o.confidence).sum();
        if sum != 0.0 {
            for o in &mut obs {
                o.confidence /= sum;
            }
        }

        // First allocation: split each observation evenly across the nodes
        // accepting its label, preferring incomplete nodes.
        for o in &obs {
            let mut candidates = self.graph.nodes_accepting(&o.label);
            if candidates.len() > 1 {
                let incomplete: Vec<u32> = candidates
                    .iter()
                    .copied()
                    .filter(|n| self.graph.node(*n).is_some_and(|n| n.c() < 1.0))
                    .collect();
                if !incomplete.is_empty() {
                    candidates = incomplete;
                }
            }
            if candidates.is_empty() {
                continue;
            }
            let share = o.confidence / candidates.len() as f64;
            for number in candidates {
                if let Some(node) = self.graph.node_mut(number) {
                    node.add_first_allocation(&o.label, share);
                }
            }
        }

        let total: f64 = obs.iter().map(|o| o.confidence).sum();
        self.graph.idle_mut().set_probability(1.0 - total);

        self.redistribute(w, quota);
        self.snap_probabilities();

        for node in self.graph.nodes_mut() {
            node.apply_time(w, quota);
        }
        self.graph.idle_mut().apply_time(w, quota);
    }

    /// Push each node's allocated mass back onto its eligible predecessors,
    /// crediting whatever cannot be placed to the node itself.
    fn redistribute(&mut self, w: f64, quota: &QuotaConfig) {
        let numbers: Vec<u32> = self.graph.nodes().iter().map(|n| n.number()).collect();
        for number in numbers {
            let allocations: Vec<(String, f64)> = match self.graph.node(number) {
                Some(node) => node
                    .first_allocation()
                    .iter()
                    .map(|(label, mass)| (label.clone(), *mass))
                    .collect(),
                None => continue,
            };
            for (label, mass) in allocations {
                let mut leftover = self.push_to_predecessors(number, &label, mass, w, quota);
                if leftover < RESIDUAL_FLOOR {
                    leftover = 0.0;
                }
                if let Some(node) = self.graph.node_mut(number) {
                    node.add_probability(leftover);
                }
            }
        }
    }

    /// Distribute `mass` across the strict ancestors of `number` that also
    /// accept `label`, proportional to each ancestor's readiness and capped
    /// by its remaining per-cycle quota capacity. Returns the unplaced mass.
    fn push_to_predecessors(
        &mut self,
        number: u32,
        label: &str,
        mass: f64,
        w: f64,
        quota: &QuotaConfig,
    ) -> f64 {
        let predecessors: Vec<u32> = self
            .graph
            .nodes_accepting(label)
            .into_iter()
            .filter(|p| self.graph.is_strict_ancestor(*p, number))
            .collect();
        if predecessors.is_empty() {
            return mass;
        }
        let readiness: Vec<f64> = predecessors
            .iter()
            .map(|p| self.graph.f(*p, quota))
            .collect();
        let readiness_total: f64 = readiness.iter().sum();
        if readiness_total == 0.0 {
            return mass;
        }

        let mut remain = mass;
        let mut passes = 0;
        while remain > REDISTRIBUTION_EPSILON && passes < REDISTRIBUTION_MAX_PASSES {
            passes += 1;
            let snapshot = remain;
            let mut saturated = 0;
            for (i, &p) in predecessors.iter().enumerate() {
                let share = snapshot * readiness[i] / readiness_total;
                let (capacity, take) = {
                    let Some(node) = self.graph.node(p) else {
                        saturated += 1;
                        continue;
                    };
                    let bounds = node.bounds(quota);
                    let capacity =
                        ((bounds.nominal - node.elapsed(quota)) / w - node.probability()).max(0.0);
                    (capacity, share.min(capacity))
                };
                if capacity <= share || take <= REDISTRIBUTION_EPSILON {
                    saturated += 1;
                }
                remain -= take;
                if let Some(node) = self.graph.node_mut(p) {
                    node.add_probability(take);
                }
            }
            if saturated == predecessors.len() {
                break;
            }
        }
        remain.max(0.0)
    }

    /// Numerical stabilization: snap tiny cycle probabilities to 0 and
    /// saturated ones to 1.
    fn snap_probabilities(&mut self) {
        snap(self.graph.idle_mut());
        for node in self.graph.nodes_mut() {
            snap(node);
        }
    }
}

fn snap(node: &mut stepline_core::Node) {
    if node.probability() <= SNAP_ZERO {
        node.set_probability(0.0);
    } else if node.probability() >= 1.0 {
        node.set_probability(1.0);
    }
}

/// Cross-combine raw head predictions into step-level observations.
///
/// Applies only when the batch holds at least two observations, none of
/// them already combined, with both an action-prefixed and an
/// object-prefixed raw label. Raw labels with neither prefix are dropped
/// when combination triggers.
fn cross_combine(obs: &[Observation]) -> Option<Vec<Observation>> {
    if obs.len() < 2 || obs.iter().any(|o| o.pair.is_some()) {
        return None;
    }
    let actions: Vec<&Observation> = obs.iter().filter(|o| o.is_action_head()).collect();
    let objects: Vec<&Observation> = obs.iter().filter(|o| o.is_object_head()).collect();
    if actions.is_empty() || objects.is_empty() {
        return None;
    }
    let mut combined = Vec::with_capacity(actions.len() * objects.len());
    for action in &actions {
        for object in &objects {
            combined.push(Observation::combine(action, object));
        }
    }
    Some(combined)
}
