//! rolegate - guard-scoped roles and permissions.
//!
//! Permissions and roles are named records scoped to an authentication
//! guard. Users (any model type) hold roles and direct permissions. A single
//! [`PermissionRegistrar`] caches every permission with its role links and is
//! shared by all stores; every mutation invalidates it once its write lands.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use rolegate::{Config, Rbac, UserRef};
//!
//! let rbac = Rbac::in_memory(&Config::default());
//! let writer = rbac.roles().create("writer", None).await?;
//! rbac.permissions().create("edit-articles", None).await?;
//! rbac.roles().give_permission_to(&writer, "edit-articles").await?;
//!
//! let alice = UserRef::new("user", 1);
//! rbac.authorization().assign_role(&alice, "writer").await?;
//! assert!(rbac.authorization().has_permission(&alice, "edit-articles", None).await?);
//! # Ok(())
//! # }
//! ```

pub mod assignment;
pub mod config;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod model;
pub mod permissions;
pub mod registrar;
pub mod roles;
pub mod storage;
pub mod telemetry;

pub use assignment::Authorization;
pub use config::Config;
pub use error::{AuthzError, AuthzResult};
pub use guard::GuardResolver;
pub use model::{
    EntityKind, Permission, PermissionId, PermissionRef, Role, RoleId, RoleRef, UserRef,
};
pub use permissions::PermissionStore;
pub use registrar::{PermissionRegistrar, PermissionSet};
pub use roles::RoleStore;
pub use storage::{MemoryBackend, PermissionBackend, SqliteBackend, StorageError};

use std::sync::Arc;
use tracing::info;

/// Everything wired to one registrar.
#[derive(Debug, Clone)]
pub struct Rbac {
    registrar: Arc<PermissionRegistrar>,
    guards: Arc<GuardResolver>,
    permissions: PermissionStore,
    roles: RoleStore,
    authorization: Authorization,
}

impl Rbac {
    pub fn new(config: &Config, backend: Arc<dyn PermissionBackend>) -> Self {
        let registrar =
            Arc::new(PermissionRegistrar::new(backend).with_ttl(config.cache.ttl()));
        let guards = Arc::new(GuardResolver::from_config(config));
        let permissions = PermissionStore::new(
            Arc::clone(&registrar),
            Arc::clone(&guards),
            config.models.permission.clone(),
        );
        let roles = RoleStore::new(
            Arc::clone(&registrar),
            Arc::clone(&guards),
            permissions.clone(),
            config.models.role.clone(),
        );
        let authorization = Authorization::new(
            Arc::clone(&registrar),
            Arc::clone(&guards),
            permissions.clone(),
            roles.clone(),
        );
        Self {
            registrar,
            guards,
            permissions,
            roles,
            authorization,
        }
    }

    /// Open the SQLite database named by `[database] path`, creating tables
    /// under the configured collection names.
    pub async fn connect(config: &Config) -> Result<Self, StorageError> {
        let database = config.database.clone().unwrap_or_default();
        let path = database.path.as_str();
        let backend = SqliteBackend::connect_with(path, config.collection_names.clone()).await?;
        info!(path = %path, guard = %config.defaults.guard, "Permission system ready");
        Ok(Self::new(config, Arc::new(backend)))
    }

    /// Backed by a fresh [`MemoryBackend`].
    pub fn in_memory(config: &Config) -> Self {
        Self::new(config, Arc::new(MemoryBackend::new()))
    }

    pub fn registrar(&self) -> &Arc<PermissionRegistrar> {
        &self.registrar
    }

    pub fn guards(&self) -> &GuardResolver {
        &self.guards
    }

    pub fn permissions(&self) -> &PermissionStore {
        &self.permissions
    }

    pub fn roles(&self) -> &RoleStore {
        &self.roles
    }

    pub fn authorization(&self) -> &Authorization {
        &self.authorization
    }
}
