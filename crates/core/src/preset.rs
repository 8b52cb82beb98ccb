//! Preset model - the configured shape of a tracked process.

use serde::{Deserialize, Serialize};

/// A named process preset: the ordered steps of one procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    /// Preset name
    pub name: String,

    /// Step specifications, ordered by intended sequence
    pub steps: Vec<StepSpec>,
}

impl Preset {
    /// Create an empty preset.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }
}

/// Specification of a single step in a preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Step number, unique within the preset; 0 is reserved for Idle
    pub number: u32,

    /// Step name
    pub name: String,

    /// Nominal duration in seconds
    pub real_quota: f64,

    /// Action labels this step accepts
    #[serde(default)]
    pub actions: Vec<String>,

    /// Numbers of the steps that must be substantially complete first
    #[serde(default)]
    pub parents: Vec<u32>,
}

impl StepSpec {
    /// Create a step spec whose only accepted action is its own name.
    pub fn new(number: u32, name: impl Into<String>, real_quota: f64) -> Self {
        let name = name.into();
        Self {
            number,
            name: name.clone(),
            real_quota,
            actions: vec![name],
            parents: Vec::new(),
        }
    }

    /// Replace the accepted action labels.
    pub fn with_actions(mut self, actions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the parent step numbers.
    pub fn with_parents(mut self, parents: impl IntoIterator<Item = u32>) -> Self {
        self.parents = parents.into_iter().collect();
        self
    }
}
