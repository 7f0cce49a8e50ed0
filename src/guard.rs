//! Guard resolution.
//!
//! Maps a model type tag to the guards that apply to it. Resolution order:
//! an explicit override for the model type, then every guard block whose
//! user model is the model type (in configuration order), then the global
//! default guard.

use crate::config::Config;
use std::collections::BTreeMap;

/// Deterministic model-type to guard mapping built from configuration.
#[derive(Debug, Clone)]
pub struct GuardResolver {
    default_guard: String,
    /// (guard name, user model type), in priority order.
    guards: Vec<(String, String)>,
    overrides: BTreeMap<String, String>,
}

impl GuardResolver {
    pub fn new(default_guard: impl Into<String>) -> Self {
        Self {
            default_guard: default_guard.into(),
            guards: Vec::new(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            default_guard: config.defaults.guard.clone(),
            guards: config
                .guards
                .iter()
                .map(|g| (g.name.clone(), g.model.clone()))
                .collect(),
            overrides: config.guard_overrides.clone(),
        }
    }

    /// Register a guard serving the given user model type.
    pub fn with_guard(mut self, name: impl Into<String>, model: impl Into<String>) -> Self {
        self.guards.push((name.into(), model.into()));
        self
    }

    /// Pin a model type to a guard regardless of the guard blocks.
    pub fn with_override(mut self, model: impl Into<String>, guard: impl Into<String>) -> Self {
        self.overrides.insert(model.into(), guard.into());
        self
    }

    /// The global fallback guard.
    pub fn default_guard(&self) -> &str {
        &self.default_guard
    }

    /// Every guard that applies to `model_type`, most specific first.
    ///
    /// Never empty: falls back to the global default guard.
    pub fn guard_names_for(&self, model_type: &str) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(guard) = self.overrides.get(model_type) {
            names.push(guard.clone());
        }
        for (guard, model) in &self.guards {
            if model == model_type && !names.contains(guard) {
                names.push(guard.clone());
            }
        }
        if names.is_empty() {
            names.push(self.default_guard.clone());
        }
        names
    }

    /// The guard used for `model_type` when a caller does not name one.
    pub fn default_guard_for(&self, model_type: &str) -> String {
        if let Some(guard) = self.overrides.get(model_type) {
            return guard.clone();
        }
        self.guards
            .iter()
            .find(|(_, model)| model == model_type)
            .map(|(guard, _)| guard.clone())
            .unwrap_or_else(|| self.default_guard.clone())
    }

    /// True when `guard` is one of the guards applying to `model_type`.
    pub fn applies_to(&self, model_type: &str, guard: &str) -> bool {
        self.guard_names_for(model_type).iter().any(|g| g == guard)
    }

    /// The user model type authenticated by `guard`, if configured.
    pub fn model_for_guard(&self, guard: &str) -> Option<&str> {
        self.guards
            .iter()
            .find(|(name, _)| name == guard)
            .map(|(_, model)| model.as_str())
    }
}

impl Default for GuardResolver {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
