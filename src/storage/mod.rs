//! Storage backend contract.
//!
//! The permission system never decides how records are persisted. It talks
//! to a [`PermissionBackend`], which must:
//! - enforce uniqueness of (name, guard_name) atomically for permissions and roles
//! - cascade link rows when a permission or role is deleted
//! - report links to missing endpoints as [`StorageError::MissingRecord`]
//!
//! Two backends ship with the crate:
//! - [`MemoryBackend`]: lock-protected in-process tables
//! - [`SqliteBackend`]: SQLx SQLite pool with table names from configuration

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::model::{EntityKind, Permission, PermissionId, Role, RoleId, UserRef};
use async_trait::async_trait;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{kind} `{name}` already exists for guard `{guard}`")]
    UniqueViolation {
        kind: EntityKind,
        name: String,
        guard: String,
    },
    #[error("no {kind} with id {id}")]
    MissingRecord { kind: EntityKind, id: i64 },
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// A permission together with the ids of every role holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    pub permission: Permission,
    pub role_ids: Vec<RoleId>,
}

#[async_trait]
pub trait PermissionBackend: Send + Sync {
    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    /// Insert a permission. Fails with `UniqueViolation` on a duplicate
    /// (name, guard) pair, atomically with respect to concurrent inserts.
    async fn insert_permission(&self, name: &str, guard: &str) -> Result<Permission, StorageError>;

    async fn find_permission(
        &self,
        name: &str,
        guard: &str,
    ) -> Result<Option<Permission>, StorageError>;

    /// Delete a permission and every link referencing it.
    /// Returns false if it did not exist.
    async fn delete_permission(&self, id: PermissionId) -> Result<bool, StorageError>;

    /// Every permission with its role links, in id order.
    async fn load_permissions(&self) -> Result<Vec<PermissionRecord>, StorageError>;

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    async fn insert_role(&self, name: &str, guard: &str) -> Result<Role, StorageError>;

    async fn find_role(&self, name: &str, guard: &str) -> Result<Option<Role>, StorageError>;

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StorageError>;

    /// Every role, in id order.
    async fn list_roles(&self) -> Result<Vec<Role>, StorageError>;

    async fn delete_role(&self, id: RoleId) -> Result<bool, StorageError>;

    // ------------------------------------------------------------------
    // Links. `attach_*` returns true when a new link was created,
    // `detach_*` returns true when an existing link was removed.
    // ------------------------------------------------------------------

    async fn attach_role_permission(
        &self,
        role: RoleId,
        permission: PermissionId,
    ) -> Result<bool, StorageError>;

    async fn detach_role_permission(
        &self,
        role: RoleId,
        permission: PermissionId,
    ) -> Result<bool, StorageError>;

    async fn attach_user_role(&self, user: &UserRef, role: RoleId) -> Result<bool, StorageError>;

    async fn detach_user_role(&self, user: &UserRef, role: RoleId) -> Result<bool, StorageError>;

    async fn user_role_ids(&self, user: &UserRef) -> Result<Vec<RoleId>, StorageError>;

    async fn role_users(&self, role: RoleId) -> Result<Vec<UserRef>, StorageError>;

    async fn attach_user_permission(
        &self,
        user: &UserRef,
        permission: PermissionId,
    ) -> Result<bool, StorageError>;

    async fn detach_user_permission(
        &self,
        user: &UserRef,
        permission: PermissionId,
    ) -> Result<bool, StorageError>;

    async fn user_permission_ids(&self, user: &UserRef) -> Result<Vec<PermissionId>, StorageError>;

    async fn permission_users(&self, permission: PermissionId)
    -> Result<Vec<UserRef>, StorageError>;
}
