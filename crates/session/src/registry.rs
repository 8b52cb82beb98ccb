//! Preset and quota registries.
//!
//! Owned stores scoped to the session manager, replacing process-wide
//! lookup caches: the per-preset disabled flag is computed when a config
//! is registered and can be invalidated explicitly when a preset's quota
//! configuration changes.

use std::collections::HashMap;

use stepline_core::{Preset, QuotaConfig};
use tracing::debug;

/// Owned store of the presets known to this process.
#[derive(Debug, Default)]
pub struct PresetRegistry {
    presets: Vec<Preset>,
}

impl PresetRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a preset, replacing any preset with the same name.
    pub fn register(&mut self, preset: Preset) {
        self.presets.retain(|p| p.name != preset.name);
        self.presets.push(preset);
    }

    /// Look up a preset by name.
    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.name == name)
    }

    /// The first registered preset, used when no name is given.
    pub fn default_preset(&self) -> Option<&Preset> {
        self.presets.first()
    }

    /// Names of all registered presets.
    pub fn names(&self) -> Vec<&str> {
        self.presets.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Owned store of per-preset quota configurations.
///
/// Caches the disabled-mode flag per preset; [`QuotaRegistry::invalidate`]
/// drops the cached flag so the next query recomputes it.
#[derive(Debug, Default)]
pub struct QuotaRegistry {
    configs: HashMap<String, QuotaConfig>,
    disabled: HashMap<String, bool>,
}

impl QuotaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the quota configuration for a preset.
    pub fn insert(&mut self, preset_name: impl Into<String>, config: QuotaConfig) {
        let preset_name = preset_name.into();
        self.disabled.insert(preset_name.clone(), config.is_disabled());
        self.configs.insert(preset_name, config);
    }

    /// Look up the configuration registered for a preset.
    pub fn get(&self, preset_name: &str) -> Option<&QuotaConfig> {
        self.configs.get(preset_name)
    }

    /// Whether quota tracking is disabled for a preset, from the cache
    /// when possible.
    pub fn is_disabled(&mut self, preset_name: &str) -> bool {
        if let Some(&flag) = self.disabled.get(preset_name) {
            return flag;
        }
        let flag = self
            .configs
            .get(preset_name)
            .map(QuotaConfig::is_disabled)
            .unwrap_or(false);
        self.disabled.insert(preset_name.to_string(), flag);
        flag
    }

    /// Drop the cached disabled flag for a preset. Call after the preset's
    /// quota configuration changed out from under the registry.
    pub fn invalidate(&mut self, preset_name: &str) {
        debug!(preset = preset_name, "invalidating cached quota mode");
        self.disabled.remove(preset_name);
    }
}
