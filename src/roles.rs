//! Role store.
//!
//! Role records are read from storage; a role's permission set is read from
//! the registrar, so `has_permission_to` never queries storage on a warm cache.

use crate::error::{AuthzError, AuthzResult};
use crate::guard::GuardResolver;
use crate::metrics;
use crate::model::{EntityKind, Permission, PermissionRef, Role, RoleId, RoleRef, UserRef};
use crate::permissions::PermissionStore;
use crate::registrar::PermissionRegistrar;
use crate::telemetry::spans;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{Instrument, debug, warn};

/// Create, find and delete roles, and manage their permission sets.
#[derive(Debug, Clone)]
pub struct RoleStore {
    registrar: Arc<PermissionRegistrar>,
    guards: Arc<GuardResolver>,
    permissions: PermissionStore,
    model_type: String,
}

impl RoleStore {
    pub fn new(
        registrar: Arc<PermissionRegistrar>,
        guards: Arc<GuardResolver>,
        permissions: PermissionStore,
        model_type: impl Into<String>,
    ) -> Self {
        Self {
            registrar,
            guards,
            permissions,
            model_type: model_type.into(),
        }
    }

    /// Guard applied when a caller passes `None`.
    pub fn default_guard(&self) -> String {
        self.guards.default_guard_for(&self.model_type)
    }

    fn guard_or_default(&self, guard: Option<&str>) -> String {
        guard.map_or_else(|| self.default_guard(), str::to_string)
    }

    /// Create a role.
    ///
    /// Fails with [`AuthzError::AlreadyExists`] if (name, guard) is taken.
    pub async fn create(&self, name: &str, guard: Option<&str>) -> AuthzResult<Role> {
        let guard = self.guard_or_default(guard);
        self.insert(name, &guard)
            .await
            .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    async fn insert(&self, name: &str, guard: &str) -> AuthzResult<Role> {
        let span = spans::mutation("create_role", name, guard);
        self.do_insert(name, guard).instrument(span).await
    }

    async fn do_insert(&self, name: &str, guard: &str) -> AuthzResult<Role> {
        let backend = self.registrar.backend();
        if backend.find_role(name, guard).await?.is_some() {
            return Err(AuthzError::AlreadyExists {
                kind: EntityKind::Role,
                name: name.to_string(),
                guard: guard.to_string(),
            });
        }

        let result = backend.insert_role(name, guard).await;
        self.registrar.forget_cached_permissions();
        let role = result?;
        debug!(id = %role.id, "Role created");
        Ok(role)
    }

    /// Find a role by name under `guard` (or the default guard).
    pub async fn find_by_name(&self, name: &str, guard: Option<&str>) -> AuthzResult<Role> {
        let guard = self.guard_or_default(guard);
        self.registrar
            .backend()
            .find_role(name, &guard)
            .await?
            .ok_or_else(|| AuthzError::not_found(EntityKind::Role, name, &guard))
            .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    pub async fn find_by_id(&self, id: RoleId) -> AuthzResult<Role> {
        self.registrar
            .backend()
            .get_role(id)
            .await?
            .ok_or(AuthzError::UnknownId {
                kind: EntityKind::Role,
                id: id.0,
            })
            .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    /// Return the role for (name, guard), creating it if needed.
    pub async fn find_or_create(&self, name: &str, guard: Option<&str>) -> AuthzResult<Role> {
        let guard = self.guard_or_default(guard);
        let backend = self.registrar.backend();
        if let Some(existing) = backend.find_role(name, &guard).await? {
            return Ok(existing);
        }

        let result = match self.insert(name, &guard).await {
            Err(AuthzError::AlreadyExists { .. }) => {
                warn!(name = %name, guard = %guard, "Lost role creation race, using existing record");
                backend
                    .find_role(name, &guard)
                    .await
                    .map_err(AuthzError::from)
                    .and_then(|found| {
                        found.ok_or_else(|| AuthzError::not_found(EntityKind::Role, name, &guard))
                    })
            }
            other => other,
        };
        result.inspect_err(|e| metrics::record_error(e.error_code()))
    }

    /// Delete a role, detaching it from every user and permission.
    ///
    /// Returns false if it was already gone.
    pub async fn delete(&self, role: &Role) -> AuthzResult<bool> {
        let span = spans::mutation("delete_role", &role.name, &role.guard_name);
        self.do_delete(role)
            .instrument(span)
            .await
            .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    async fn do_delete(&self, role: &Role) -> AuthzResult<bool> {
        let result = self.registrar.backend().delete_role(role.id).await;
        self.registrar.forget_cached_permissions();
        let deleted = result?;
        debug!(id = %role.id, deleted, "Role deleted");
        Ok(deleted)
    }

    /// Every role, in id order.
    pub async fn all(&self) -> AuthzResult<Vec<Role>> {
        Ok(self.registrar.backend().list_roles().await?)
    }

    pub async fn for_guard(&self, guard: &str) -> AuthzResult<Vec<Role>> {
        let roles = self.registrar.backend().list_roles().await?;
        Ok(roles.into_iter().filter(|r| r.guard_name == guard).collect())
    }

    /// Users holding the role, restricted to the user model of the role's guard.
    pub async fn users(&self, role: &Role) -> AuthzResult<Vec<UserRef>> {
        let users = self.registrar.backend().role_users(role.id).await?;
        Ok(match self.guards.model_for_guard(&role.guard_name) {
            Some(model) => users.into_iter().filter(|u| u.model_type == model).collect(),
            None => users,
        })
    }

    /// Resolve a permission for this role and check the guards agree.
    async fn permission_for(&self, role: &Role, permission: PermissionRef<'_>) -> AuthzResult<Permission> {
        let permission = self.permissions.resolve(permission, &role.guard_name).await?;
        if permission.guard_name != role.guard_name {
            return Err(AuthzError::guard_mismatch(
                std::slice::from_ref(&role.guard_name),
                &permission.guard_name,
            ));
        }
        Ok(permission)
    }

    /// Grant a permission to a role. Granting twice is a no-op.
    ///
    /// Names resolve under the role's guard. A permission record or id from
    /// another guard fails with [`AuthzError::GuardMismatch`].
    pub async fn give_permission_to<'a>(
        &self,
        role: &Role,
        permission: impl Into<PermissionRef<'a>>,
    ) -> AuthzResult<()> {
        let permission = permission.into();
        async {
            let permission = self.permission_for(role, permission).await?;
            let result = self
                .registrar
                .backend()
                .attach_role_permission(role.id, permission.id)
                .await;
            self.registrar.forget_cached_permissions();
            let created = result?;
            debug!(role = %role.name, permission = %permission.name, created, "Permission given to role");
            Ok::<_, AuthzError>(())
        }
        .instrument(spans::mutation("give_permission_to_role", &role.name, &role.guard_name))
        .await
        .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    /// Grant several permissions to a role, stopping at the first failure.
    pub async fn give_permissions_to<'a, I>(&self, role: &Role, permissions: I) -> AuthzResult<()>
    where
        I: IntoIterator,
        I::Item: Into<PermissionRef<'a>>,
    {
        for permission in permissions {
            self.give_permission_to(role, permission).await?;
        }
        Ok(())
    }

    /// Revoke a permission from a role. Revoking a permission the role does
    /// not hold is a no-op.
    pub async fn revoke_permission_to<'a>(
        &self,
        role: &Role,
        permission: impl Into<PermissionRef<'a>>,
    ) -> AuthzResult<()> {
        let permission = permission.into();
        async {
            let permission = self.permission_for(role, permission).await?;
            let result = self
                .registrar
                .backend()
                .detach_role_permission(role.id, permission.id)
                .await;
            self.registrar.forget_cached_permissions();
            let removed = result?;
            debug!(role = %role.name, permission = %permission.name, removed, "Permission revoked from role");
            Ok::<_, AuthzError>(())
        }
        .instrument(spans::mutation("revoke_permission_to_role", &role.name, &role.guard_name))
        .await
        .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    /// Replace the role's permission set.
    ///
    /// Every reference is resolved before anything changes, so an unknown
    /// name leaves the role untouched.
    pub async fn sync_permissions<'a, I>(&self, role: &Role, permissions: I) -> AuthzResult<()>
    where
        I: IntoIterator,
        I::Item: Into<PermissionRef<'a>>,
    {
        let permissions: Vec<PermissionRef<'a>> =
            permissions.into_iter().map(|p| p.into()).collect();
        let span = spans::mutation("sync_permissions", &role.name, &role.guard_name);
        self.do_sync_permissions(role, &permissions)
            .instrument(span)
            .await
            .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    async fn do_sync_permissions(
        &self,
        role: &Role,
        permissions: &[PermissionRef<'_>],
    ) -> AuthzResult<()> {
        let mut wanted = BTreeSet::new();
        for permission in permissions {
            wanted.insert(self.permission_for(role, *permission).await?.id);
        }

        let set = self.registrar.permissions().await?;
        let current: BTreeSet<_> = set.for_role(role.id).map(|p| p.id).collect();
        drop(set);

        let backend = self.registrar.backend();
        let mut result = Ok(());
        for id in current.difference(&wanted) {
            if let Err(e) = backend.detach_role_permission(role.id, *id).await {
                result = Err(e);
                break;
            }
        }
        if result.is_ok() {
            for id in wanted.difference(&current) {
                if let Err(e) = backend.attach_role_permission(role.id, *id).await {
                    result = Err(e);
                    break;
                }
            }
        }
        self.registrar.forget_cached_permissions();
        debug!(role = %role.name, count = wanted.len(), "Role permissions synced");
        result.map_err(AuthzError::from)
    }

    /// True when the role holds the permission, per the registrar's view.
    ///
    /// Unknown permissions and permissions of another guard yield `false`.
    pub async fn has_permission_to<'a>(
        &self,
        role: &Role,
        permission: impl Into<PermissionRef<'a>>,
    ) -> AuthzResult<bool> {
        let set = self.registrar.permissions().await?;
        let granted = set
            .resolve(permission.into(), &role.guard_name)
            .is_some_and(|p| p.guard_name == role.guard_name && set.role_has(role.id, p.id));
        metrics::record_check("role_has_permission", granted);
        Ok(granted)
    }

    /// Permissions held by the role.
    pub async fn permissions(&self, role: &Role) -> AuthzResult<Vec<Permission>> {
        let set = self.registrar.permissions().await?;
        Ok(set.for_role(role.id).cloned().collect())
    }

    /// Resolve a reference to a stored role. Names resolve under `guard`.
    pub(crate) async fn resolve(&self, role: RoleRef<'_>, guard: &str) -> AuthzResult<Role> {
        let backend = self.registrar.backend();
        match role {
            RoleRef::Name(name) => backend
                .find_role(name, guard)
                .await?
                .ok_or_else(|| AuthzError::not_found(EntityKind::Role, name, guard)),
            RoleRef::Id(id) => backend.get_role(id).await?.ok_or(AuthzError::UnknownId {
                kind: EntityKind::Role,
                id: id.0,
            }),
            RoleRef::Record(r) => backend.get_role(r.id).await?.ok_or(AuthzError::UnknownId {
                kind: EntityKind::Role,
                id: r.id.0,
            }),
        }
    }
}
