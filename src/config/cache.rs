//! Registrar cache configuration.

use serde::Deserialize;
use std::time::Duration;

/// Registrar cache settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Maximum age of a loaded permission set in seconds.
    /// Unset means the set only expires on invalidation.
    pub ttl_secs: Option<u64>,
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}
