//! Timeline types - when each step actually happened.

use std::collections::BTreeMap;

use crate::graph::StepRef;

/// Ordered mapping from milliseconds (since session start, or dwell time
/// after the dwell filter) to the step active at that instant.
pub type Timeline = BTreeMap<i64, StepRef>;
