//! Core configuration types and loading.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use super::cache::CacheConfig;
use super::defaults::{default_guard, default_permission_model, default_role_model};
use super::guards::{GuardBlock, default_guards};
use super::storage::{CollectionNames, DatabaseConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Permission system configuration.
///
/// Every section is optional; an empty file yields [`Config::default`].
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// Guard blocks, in priority order.
    #[serde(default = "default_guards")]
    pub guards: Vec<GuardBlock>,
    /// Model type -> guard name, taking precedence over the guard blocks.
    #[serde(default)]
    pub guard_overrides: BTreeMap<String, String>,
    /// Model tags for permission and role records.
    #[serde(default)]
    pub models: ModelsConfig,
    /// Storage collection (table) names.
    #[serde(default)]
    pub collection_names: CollectionNames,
    /// Registrar cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Database used by the admin CLI.
    pub database: Option<DatabaseConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            guards: default_guards(),
            guard_overrides: BTreeMap::new(),
            models: ModelsConfig::default(),
            collection_names: CollectionNames::default(),
            cache: CacheConfig::default(),
            database: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// Global defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    /// Guard used when nothing more specific applies.
    #[serde(default = "default_guard")]
    pub guard: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            guard: default_guard(),
        }
    }
}

/// Model tags used when resolving the default guard of permission and
/// role records.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_permission_model")]
    pub permission: String,
    #[serde(default = "default_role_model")]
    pub role: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            permission: default_permission_model(),
            role: default_role_model(),
        }
    }
}
