//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

// =============================================================================
// Guard Defaults
// =============================================================================

pub fn default_guard() -> String {
    "web".to_string()
}

pub fn default_user_model() -> String {
    "user".to_string()
}

// =============================================================================
// Model Tag Defaults
// =============================================================================

pub fn default_permission_model() -> String {
    "permission".to_string()
}

pub fn default_role_model() -> String {
    "role".to_string()
}

// =============================================================================
// Collection Name Defaults
// =============================================================================

pub fn default_permissions_collection() -> String {
    "permissions".to_string()
}

pub fn default_roles_collection() -> String {
    "roles".to_string()
}

pub fn default_role_has_permissions_collection() -> String {
    "role_has_permissions".to_string()
}

pub fn default_model_has_roles_collection() -> String {
    "model_has_roles".to_string()
}

pub fn default_model_has_permissions_collection() -> String {
    "model_has_permissions".to_string()
}

// =============================================================================
// Database Defaults
// =============================================================================

pub fn default_database_path() -> String {
    "rolegate.db".to_string()
}
