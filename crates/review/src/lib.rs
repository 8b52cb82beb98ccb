//! stepline review - retrospective timeline reconstruction and statistics.
//!
//! Turns a recorded session into a timeline of step transitions, filters
//! it down to the significant transitions, and aggregates per-step timing
//! statistics across sessions.

#![warn(missing_docs)]

mod reconstruct;
mod stats;

pub use reconstruct::{clean, dwell_of, filter_by_dwell, offline_timeline, raw_timeline};
pub use stats::{step_stats, StepStats};
