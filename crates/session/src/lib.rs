//! stepline session layer - live session lifecycle and derived alerts.
//!
//! Owns the per-user trackers, the preset and quota registries (including
//! the cached disabled-mode flag with explicit invalidation), and the
//! alarm and progress-bar views over live graph state.

#![warn(missing_docs)]

mod alarm;
mod manager;
mod registry;

pub use alarm::{evaluate_alarms, Alarm, Severity};
pub use manager::{ProgressBar, SessionManager};
pub use registry::{PresetRegistry, QuotaRegistry};
