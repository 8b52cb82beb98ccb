//! Session lifecycle management.

use std::collections::HashMap;

use serde::Serialize;
use stepline_core::{
    CoreError, Observation, ProcessGraph, QuotaConfig, QuotaMode, Result, SessionId, SessionLog,
    StepRef, Time,
};
use stepline_engine::ProgressTracker;
use tracing::{debug, info};

use crate::alarm::{evaluate_alarms, Alarm};
use crate::registry::{PresetRegistry, QuotaRegistry};

/// Progress information for one step, for display surfaces.
///
/// Handling steps are excluded; the Idle pseudo-step is included last.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressBar {
    /// Step number
    pub index: u32,

    /// Step name
    pub name: String,

    /// Resolved nominal quota in seconds
    pub quota: f64,

    /// Parent step numbers
    pub parents: Vec<u32>,

    /// Quota-normalized completion; may exceed 1 on overrun
    pub progress: f64,

    /// This cycle's probability
    pub p: f64,
}

struct Session {
    id: SessionId,
    preset_name: String,
    started_at: Time,
    tracker: ProgressTracker,
}

/// Owner of all live tracking sessions.
///
/// One tracker per user; calls into one session must be serialized by the
/// caller. The manager holds the preset and quota registries and is plain
/// owned state with no internal synchronization.
pub struct SessionManager {
    presets: PresetRegistry,
    quotas: QuotaRegistry,
    sessions: HashMap<String, Session>,
}

impl SessionManager {
    /// Create a manager over the given registries.
    pub fn new(presets: PresetRegistry, quotas: QuotaRegistry) -> Self {
        Self {
            presets,
            quotas,
            sessions: HashMap::new(),
        }
    }

    /// The preset registry.
    pub fn presets(&self) -> &PresetRegistry {
        &self.presets
    }

    /// Mutable access to the quota registry, e.g. to invalidate a cached
    /// quota mode after a configuration change.
    pub fn quotas_mut(&mut self) -> &mut QuotaRegistry {
        &mut self.quotas
    }

    /// Start a session for `user` against a named preset, replacing any
    /// session the user already had.
    pub fn start(&mut self, user: &str, preset_name: &str) -> Result<SessionId> {
        let preset = self
            .presets
            .get(preset_name)
            .ok_or_else(|| CoreError::UnknownPreset(preset_name.to_string()))?;
        let id = SessionId::new();
        info!(user, preset = preset_name, %id, "starting session");
        self.sessions.insert(
            user.to_string(),
            Session {
                id,
                preset_name: preset_name.to_string(),
                started_at: chrono::Utc::now(),
                tracker: ProgressTracker::new(ProcessGraph::from_preset(preset)),
            },
        );
        Ok(id)
    }

    /// Start a session against the first registered preset.
    pub fn start_default(&mut self, user: &str) -> Result<SessionId> {
        let name = self
            .presets
            .default_preset()
            .map(|p| p.name.clone())
            .ok_or_else(|| CoreError::UnknownPreset("<default>".to_string()))?;
        self.start(user, &name)
    }

    /// Feed one observation batch into a user's session.
    pub fn ingest(&mut self, user: &str, timestamp_ms: i64, batch: &[Observation]) -> Result<()> {
        let preset_name = self.session(user)?.preset_name.clone();
        // The cached mode flag saves resolving the full config per batch.
        let config = if self.quotas.is_disabled(&preset_name) {
            QuotaConfig {
                mode: QuotaMode::Disabled,
                entries: Vec::new(),
            }
        } else {
            self.config_for(&preset_name)
        };
        let session = self.session_mut(user)?;
        session.tracker.update(timestamp_ms, batch, &config);
        Ok(())
    }

    /// Reset a user's session and replay its recorded batches up to
    /// `till_ms`.
    pub fn rewind_to(&mut self, user: &str, till_ms: i64) -> Result<()> {
        let config = self.config_for_user(user)?;
        let session = self.session_mut(user)?;
        session.tracker.rewind_to(till_ms, &config);
        Ok(())
    }

    /// The most probable current step of a user's session.
    pub fn most_probable(&self, user: &str) -> Result<StepRef> {
        Ok(self.session(user)?.tracker.most_probable_state())
    }

    /// Progress bars for every non-handling step plus Idle.
    pub fn progress_bars(&self, user: &str) -> Result<Vec<ProgressBar>> {
        let session = self.session(user)?;
        let config = self.config_for(&session.preset_name);
        let graph = session.tracker.graph();

        let mut bars: Vec<ProgressBar> = graph
            .nodes()
            .iter()
            .chain(std::iter::once(graph.idle()))
            .filter(|node| !node.is_handling())
            .map(|node| ProgressBar {
                index: node.number(),
                name: node.name().to_string(),
                quota: node.bounds(&config).nominal,
                parents: node.parents().to_vec(),
                progress: node.real_c(),
                p: node.probability(),
            })
            .collect();
        bars.sort_by_key(|bar| bar.index);
        Ok(bars)
    }

    /// Alarms derived from a user's live graph state.
    pub fn alarms(&self, user: &str) -> Result<Vec<Alarm>> {
        let session = self.session(user)?;
        let config = self.config_for(&session.preset_name);
        Ok(evaluate_alarms(session.tracker.graph(), &config))
    }

    /// Stop a user's session and return its log.
    pub fn stop(&mut self, user: &str) -> Result<SessionLog> {
        let session = self
            .sessions
            .remove(user)
            .ok_or_else(|| CoreError::NoActiveSession(user.to_string()))?;
        info!(user, id = %session.id, "stopping session");
        Ok(SessionLog {
            id: session.id,
            user: user.to_string(),
            preset_name: session.preset_name,
            start_time: session.started_at,
            end_time: chrono::Utc::now(),
            observations: session.tracker.observations().clone(),
        })
    }

    /// Drop a user's session without producing a log.
    pub fn discard(&mut self, user: &str) {
        if self.sessions.remove(user).is_some() {
            debug!(user, "discarded session");
        }
    }

    /// The quota configuration for a preset, synthesizing offset-mode
    /// defaults from the preset itself when none is registered.
    fn config_for(&self, preset_name: &str) -> QuotaConfig {
        if let Some(config) = self.quotas.get(preset_name) {
            return config.clone();
        }
        match self.presets.get(preset_name) {
            Some(preset) => QuotaConfig::defaults_for(preset),
            None => QuotaConfig::defaults_for(&stepline_core::Preset::new(preset_name)),
        }
    }

    fn config_for_user(&self, user: &str) -> Result<QuotaConfig> {
        let session = self.session(user)?;
        Ok(self.config_for(&session.preset_name))
    }

    fn session(&self, user: &str) -> Result<&Session> {
        self.sessions
            .get(user)
            .ok_or_else(|| CoreError::NoActiveSession(user.to_string()))
    }

    fn session_mut(&mut self, user: &str) -> Result<&mut Session> {
        self.sessions
            .get_mut(user)
            .ok_or_else(|| CoreError::NoActiveSession(user.to_string()))
    }
}
