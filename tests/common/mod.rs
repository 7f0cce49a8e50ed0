//! Integration test common infrastructure.
//!
//! Provides a two-guard test configuration, facade constructors for both
//! backends, and a backend wrapper that counts permission loads.

#![allow(dead_code)]

use async_trait::async_trait;
use rolegate::model::{Permission, PermissionId, Role, RoleId, UserRef};
use rolegate::storage::PermissionRecord;
use rolegate::{Config, MemoryBackend, PermissionBackend, Rbac, SqliteBackend, StorageError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// `web` and `api` for users, `partner` for clients.
pub fn test_config() -> Config {
    Config::parse(
        r#"
        [defaults]
        guard = "web"

        [[guards]]
        name = "web"
        model = "user"

        [[guards]]
        name = "api"
        model = "user"

        [[guards]]
        name = "partner"
        model = "client"
        "#,
    )
    .expect("test config parses")
}

pub fn memory_rbac() -> Rbac {
    Rbac::in_memory(&test_config())
}

pub async fn sqlite_rbac() -> Rbac {
    let backend = SqliteBackend::connect(":memory:")
        .await
        .expect("in-memory sqlite opens");
    Rbac::new(&test_config(), Arc::new(backend))
}

/// Wraps a [`MemoryBackend`], counting `load_permissions` calls and
/// optionally stalling each load.
pub struct CountingBackend {
    inner: MemoryBackend,
    loads: AtomicUsize,
    load_delay: Duration,
}

impl CountingBackend {
    pub fn new(load_delay: Duration) -> Self {
        Self {
            inner: MemoryBackend::new(),
            loads: AtomicUsize::new(0),
            load_delay,
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionBackend for CountingBackend {
    async fn insert_permission(&self, name: &str, guard: &str) -> Result<Permission, StorageError> {
        self.inner.insert_permission(name, guard).await
    }

    async fn find_permission(
        &self,
        name: &str,
        guard: &str,
    ) -> Result<Option<Permission>, StorageError> {
        self.inner.find_permission(name, guard).await
    }

    async fn delete_permission(&self, id: PermissionId) -> Result<bool, StorageError> {
        self.inner.delete_permission(id).await
    }

    async fn load_permissions(&self) -> Result<Vec<PermissionRecord>, StorageError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let records = self.inner.load_permissions().await?;
        // Stall after reading, so the returned snapshot can go stale.
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        Ok(records)
    }

    async fn insert_role(&self, name: &str, guard: &str) -> Result<Role, StorageError> {
        self.inner.insert_role(name, guard).await
    }

    async fn find_role(&self, name: &str, guard: &str) -> Result<Option<Role>, StorageError> {
        self.inner.find_role(name, guard).await
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StorageError> {
        self.inner.get_role(id).await
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StorageError> {
        self.inner.list_roles().await
    }

    async fn delete_role(&self, id: RoleId) -> Result<bool, StorageError> {
        self.inner.delete_role(id).await
    }

    async fn attach_role_permission(
        &self,
        role: RoleId,
        permission: PermissionId,
    ) -> Result<bool, StorageError> {
        self.inner.attach_role_permission(role, permission).await
    }

    async fn detach_role_permission(
        &self,
        role: RoleId,
        permission: PermissionId,
    ) -> Result<bool, StorageError> {
        self.inner.detach_role_permission(role, permission).await
    }

    async fn attach_user_role(&self, user: &UserRef, role: RoleId) -> Result<bool, StorageError> {
        self.inner.attach_user_role(user, role).await
    }

    async fn detach_user_role(&self, user: &UserRef, role: RoleId) -> Result<bool, StorageError> {
        self.inner.detach_user_role(user, role).await
    }

    async fn user_role_ids(&self, user: &UserRef) -> Result<Vec<RoleId>, StorageError> {
        self.inner.user_role_ids(user).await
    }

    async fn role_users(&self, role: RoleId) -> Result<Vec<UserRef>, StorageError> {
        self.inner.role_users(role).await
    }

    async fn attach_user_permission(
        &self,
        user: &UserRef,
        permission: PermissionId,
    ) -> Result<bool, StorageError> {
        self.inner.attach_user_permission(user, permission).await
    }

    async fn detach_user_permission(
        &self,
        user: &UserRef,
        permission: PermissionId,
    ) -> Result<bool, StorageError> {
        self.inner.detach_user_permission(user, permission).await
    }

    async fn user_permission_ids(&self, user: &UserRef) -> Result<Vec<PermissionId>, StorageError> {
        self.inner.user_permission_ids(user).await
    }

    async fn permission_users(
        &self,
        permission: PermissionId,
    ) -> Result<Vec<UserRef>, StorageError> {
        self.inner.permission_users(permission).await
    }
}
