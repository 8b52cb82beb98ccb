//! Session log - the record of one finished tracking session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::SessionId;
use crate::observation::Observation;
use crate::Time;

/// Everything recorded about one tracking session: who ran it, against
/// which preset, when, and every observation batch that was ingested.
///
/// Observation keys are milliseconds since session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLog {
    /// Session identifier
    pub id: SessionId,

    /// User who ran the session
    pub user: String,

    /// Preset the session tracked
    pub preset_name: String,

    /// Wall-clock session start
    pub start_time: Time,

    /// Wall-clock session end
    pub end_time: Time,

    /// Recorded observation batches, keyed by milliseconds since start
    pub observations: BTreeMap<i64, Vec<Observation>>,
}

impl SessionLog {
    /// Total session duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}
