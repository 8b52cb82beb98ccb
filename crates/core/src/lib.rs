//! stepline core data models.
//!
//! This crate defines the process graph, quota configuration, and
//! observation types that power the step-progress tracking engine.

#![warn(missing_docs)]

// Core identities
mod id;
mod error;

// Inbound configuration
mod preset;
mod quota;

// Observations and graph state
mod observation;
mod node;
mod graph;

// Timelines and session records
mod timeline;
mod session;

// Re-exports
pub use id::SessionId;
pub use error::{CoreError, Result};

// Configuration
pub use preset::{Preset, StepSpec};
pub use quota::{
    QuotaBounds, QuotaConfig, QuotaEntry, QuotaMode, DEFAULT_LOWER_RATIO, DEFAULT_UPPER_RATIO,
    MIN_PLAUSIBLE_QUOTA,
};

// Observations & graph
pub use observation::{Observation, ACTION_PREFIX, OBJECT_PREFIX};
pub use node::{Node, IDLE_QUOTA, IDLE_STEP_NUMBER, TRANSFER_ACTION};
pub use graph::{ProcessGraph, StepRef};

// Timeline & session
pub use timeline::Timeline;
pub use session::SessionLog;

/// Timestamp type for session wall-clock bounds
pub type Time = chrono::DateTime<chrono::Utc>;
