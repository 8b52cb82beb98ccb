//! Observation model - confidence-scored vision predictions.

use serde::{Deserialize, Serialize};

/// Label prefix tagging raw action-head predictions
pub const ACTION_PREFIX: &str = "action";

/// Label prefix tagging raw object-head predictions
pub const OBJECT_PREFIX: &str = "object";

/// A single vision-model prediction at a point in time.
///
/// Either a pre-combined action-object pair, or a raw single-head
/// prediction that still needs cross-combination before it can act as a
/// step-level signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Label carried by the prediction, e.g. "pick screw"
    pub label: String,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Constituent (action, object) labels when this observation was
    /// combined from two raw head predictions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<(String, String)>,
}

impl Observation {
    /// Create an observation from a single label.
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
            pair: None,
        }
    }

    /// Combine an action-head and an object-head prediction.
    ///
    /// The combined label joins both labels with a space and the combined
    /// confidence is the product of both confidences.
    pub fn combine(action: &Observation, object: &Observation) -> Self {
        Self {
            label: format!("{} {}", action.label, object.label),
            confidence: action.confidence * object.confidence,
            pair: Some((action.label.clone(), object.label.clone())),
        }
    }

    /// Whether this is a raw prediction from the action head.
    pub fn is_action_head(&self) -> bool {
        self.pair.is_none() && self.label.starts_with(ACTION_PREFIX)
    }

    /// Whether this is a raw prediction from the object head.
    pub fn is_object_head(&self) -> bool {
        self.pair.is_none() && self.label.starts_with(OBJECT_PREFIX)
    }
}
