//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Root config struct, defaults and model tags
//! - [`guards`]: Guard blocks and per-model guard overrides
//! - [`storage`]: Collection names and the CLI database path
//! - [`cache`]: Registrar cache settings
//! - [`validation`]: Startup validation reporting every problem at once

mod cache;
mod defaults;
mod guards;
mod storage;
mod types;
pub mod validation;

pub use cache::CacheConfig;
pub use guards::GuardBlock;
pub use storage::{CollectionNames, DatabaseConfig};
pub use types::{Config, ConfigError, DefaultsConfig, ModelsConfig};
pub use validation::{ValidationError, validate};
