//! Guard block configuration.

use serde::Deserialize;

use super::defaults::{default_guard, default_user_model};

/// A guard and the user model type it authenticates.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardBlock {
    /// Guard name (e.g., "web", "api").
    pub name: String,
    /// User model type served by this guard.
    #[serde(default = "default_user_model")]
    pub model: String,
}

pub(super) fn default_guards() -> Vec<GuardBlock> {
    vec![GuardBlock {
        name: default_guard(),
        model: default_user_model(),
    }]
}
