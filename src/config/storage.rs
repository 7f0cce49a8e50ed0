//! Storage collection configuration.

use serde::Deserialize;

use super::defaults::{
    default_database_path, default_model_has_permissions_collection,
    default_model_has_roles_collection, default_permissions_collection,
    default_role_has_permissions_collection, default_roles_collection,
};

/// Names of the five storage collections (SQL tables for the SQLite backend).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectionNames {
    #[serde(default = "default_permissions_collection")]
    pub permissions: String,
    #[serde(default = "default_roles_collection")]
    pub roles: String,
    #[serde(default = "default_role_has_permissions_collection")]
    pub role_has_permissions: String,
    #[serde(default = "default_model_has_roles_collection")]
    pub model_has_roles: String,
    #[serde(default = "default_model_has_permissions_collection")]
    pub model_has_permissions: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            permissions: default_permissions_collection(),
            roles: default_roles_collection(),
            role_has_permissions: default_role_has_permissions_collection(),
            model_has_roles: default_model_has_roles_collection(),
            model_has_permissions: default_model_has_permissions_collection(),
        }
    }
}

impl CollectionNames {
    /// All names, in declaration order.
    pub fn all(&self) -> [&str; 5] {
        [
            &self.permissions,
            &self.roles,
            &self.role_has_permissions,
            &self.model_has_roles,
            &self.model_has_permissions,
        ]
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or ":memory:".
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}
