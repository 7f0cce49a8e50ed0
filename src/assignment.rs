//! User assignments and authorization checks.
//!
//! A user holds roles and direct permissions. Names resolve under the
//! default guard of the user's model type; records and ids keep their own
//! guard, which must be one of the user's guards.
//!
//! Checks never fail for unknown roles or permissions, they answer `false`.
//! Only storage failures surface as errors.

use crate::error::{AuthzError, AuthzResult};
use crate::guard::GuardResolver;
use crate::metrics;
use crate::model::{Permission, PermissionRef, Role, RoleId, RoleRef, UserRef};
use crate::permissions::PermissionStore;
use crate::registrar::PermissionRegistrar;
use crate::roles::RoleStore;
use crate::telemetry::spans;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{Instrument, debug};

#[derive(Debug, Clone)]
pub struct Authorization {
    registrar: Arc<PermissionRegistrar>,
    guards: Arc<GuardResolver>,
    permissions: PermissionStore,
    roles: RoleStore,
}

impl Authorization {
    pub fn new(
        registrar: Arc<PermissionRegistrar>,
        guards: Arc<GuardResolver>,
        permissions: PermissionStore,
        roles: RoleStore,
    ) -> Self {
        Self {
            registrar,
            guards,
            permissions,
            roles,
        }
    }

    fn ensure_guard(&self, user: &UserRef, guard: &str) -> AuthzResult<()> {
        if self.guards.applies_to(&user.model_type, guard) {
            Ok(())
        } else {
            Err(AuthzError::guard_mismatch(
                &self.guards.guard_names_for(&user.model_type),
                guard,
            ))
        }
    }

    async fn role_for(&self, user: &UserRef, role: RoleRef<'_>) -> AuthzResult<Role> {
        let guard = self.guards.default_guard_for(&user.model_type);
        let role = self.roles.resolve(role, &guard).await?;
        self.ensure_guard(user, &role.guard_name)?;
        Ok(role)
    }

    async fn permission_for(
        &self,
        user: &UserRef,
        permission: PermissionRef<'_>,
    ) -> AuthzResult<Permission> {
        let guard = self.guards.default_guard_for(&user.model_type);
        let permission = self.permissions.resolve(permission, &guard).await?;
        self.ensure_guard(user, &permission.guard_name)?;
        Ok(permission)
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    /// Assign a role to a user. Assigning twice is a no-op.
    pub async fn assign_role<'a>(&self, user: &UserRef, role: impl Into<RoleRef<'a>>) -> AuthzResult<()> {
        let role = role.into();
        async {
            let role = self.role_for(user, role).await?;
            let result = self.registrar.backend().attach_user_role(user, role.id).await;
            self.registrar.forget_cached_permissions();
            let created = result?;
            debug!(user = %user, role = %role.name, created, "Role assigned");
            Ok::<_, AuthzError>(())
        }
        .instrument(spans::assignment("assign_role", user, &role_label(role)))
        .await
        .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    /// Assign several roles, stopping at the first failure.
    pub async fn assign_roles<'a, I>(&self, user: &UserRef, roles: I) -> AuthzResult<()>
    where
        I: IntoIterator,
        I::Item: Into<RoleRef<'a>>,
    {
        for role in roles {
            self.assign_role(user, role).await?;
        }
        Ok(())
    }

    /// Remove a role from a user. Removing a role the user lacks is a no-op.
    pub async fn remove_role<'a>(&self, user: &UserRef, role: impl Into<RoleRef<'a>>) -> AuthzResult<()> {
        let role = role.into();
        async {
            let role = self.role_for(user, role).await?;
            let result = self.registrar.backend().detach_user_role(user, role.id).await;
            self.registrar.forget_cached_permissions();
            let removed = result?;
            debug!(user = %user, role = %role.name, removed, "Role removed");
            Ok::<_, AuthzError>(())
        }
        .instrument(spans::assignment("remove_role", user, &role_label(role)))
        .await
        .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    /// Replace the user's roles. Every reference is resolved first, so a
    /// bad one leaves the user's roles untouched.
    pub async fn sync_roles<'a, I>(&self, user: &UserRef, roles: I) -> AuthzResult<()>
    where
        I: IntoIterator,
        I::Item: Into<RoleRef<'a>>,
    {
        let roles: Vec<RoleRef<'a>> = roles.into_iter().map(|r| r.into()).collect();
        let span = spans::assignment("sync_roles", user, &format!("{} roles", roles.len()));
        self.do_sync_roles(user, &roles)
            .instrument(span)
            .await
            .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    async fn do_sync_roles(&self, user: &UserRef, roles: &[RoleRef<'_>]) -> AuthzResult<()> {
        let mut wanted = BTreeSet::new();
        for role in roles {
            wanted.insert(self.role_for(user, *role).await?.id);
        }

        let backend = self.registrar.backend();
        let current: BTreeSet<_> = backend.user_role_ids(user).await?.into_iter().collect();

        let mut result = Ok(());
        for id in current.difference(&wanted) {
            if let Err(e) = backend.detach_user_role(user, *id).await {
                result = Err(e);
                break;
            }
        }
        if result.is_ok() {
            for id in wanted.difference(&current) {
                if let Err(e) = backend.attach_user_role(user, *id).await {
                    result = Err(e);
                    break;
                }
            }
        }
        self.registrar.forget_cached_permissions();
        debug!(user = %user, count = wanted.len(), "User roles synced");
        result.map_err(AuthzError::from)
    }

    /// Roles held by the user, in id order.
    pub async fn roles(&self, user: &UserRef) -> AuthzResult<Vec<Role>> {
        let backend = self.registrar.backend();
        let ids = backend.user_role_ids(user).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let roles = backend.list_roles().await?;
        Ok(roles.into_iter().filter(|r| ids.contains(&r.id)).collect())
    }

    pub async fn role_names(&self, user: &UserRef) -> AuthzResult<Vec<String>> {
        Ok(self.roles(user).await?.into_iter().map(|r| r.name).collect())
    }

    /// True when the user holds the role.
    ///
    /// A name matches any of the user's roles carrying it, whatever the guard.
    pub async fn has_role<'a>(&self, user: &UserRef, role: impl Into<RoleRef<'a>>) -> AuthzResult<bool> {
        let role = role.into();
        let span = spans::check("has_role", user, &role_label(role));
        let held = self.roles(user).instrument(span).await?;
        let granted = held.iter().any(|r| role_matches(r, role));
        metrics::record_check("has_role", granted);
        Ok(granted)
    }

    /// True when the user holds at least one of the roles.
    pub async fn has_any_role<'a, I>(&self, user: &UserRef, roles: I) -> AuthzResult<bool>
    where
        I: IntoIterator,
        I::Item: Into<RoleRef<'a>>,
    {
        let held = self.roles(user).await?;
        let mut granted = false;
        for wanted in roles {
            let wanted: RoleRef<'_> = wanted.into();
            if held.iter().any(|r| role_matches(r, wanted)) {
                granted = true;
                break;
            }
        }
        metrics::record_check("has_any_role", granted);
        Ok(granted)
    }

    /// True when the user holds every one of the roles.
    pub async fn has_all_roles<'a, I>(&self, user: &UserRef, roles: I) -> AuthzResult<bool>
    where
        I: IntoIterator,
        I::Item: Into<RoleRef<'a>>,
    {
        let held = self.roles(user).await?;
        let mut granted = true;
        for wanted in roles {
            let wanted: RoleRef<'_> = wanted.into();
            if !held.iter().any(|r| role_matches(r, wanted)) {
                granted = false;
                break;
            }
        }
        metrics::record_check("has_all_roles", granted);
        Ok(granted)
    }

    // ------------------------------------------------------------------
    // Direct permissions
    // ------------------------------------------------------------------

    /// Grant a permission directly to a user. Granting twice is a no-op.
    pub async fn give_permission_to<'a>(
        &self,
        user: &UserRef,
        permission: impl Into<PermissionRef<'a>>,
    ) -> AuthzResult<()> {
        let permission = permission.into();
        async {
            let permission = self.permission_for(user, permission).await?;
            let result = self
                .registrar
                .backend()
                .attach_user_permission(user, permission.id)
                .await;
            self.registrar.forget_cached_permissions();
            let created = result?;
            debug!(user = %user, permission = %permission.name, created, "Permission given to user");
            Ok::<_, AuthzError>(())
        }
        .instrument(spans::assignment("give_permission_to", user, &permission_label(permission)))
        .await
        .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    pub async fn revoke_permission_to<'a>(
        &self,
        user: &UserRef,
        permission: impl Into<PermissionRef<'a>>,
    ) -> AuthzResult<()> {
        let permission = permission.into();
        async {
            let permission = self.permission_for(user, permission).await?;
            let result = self
                .registrar
                .backend()
                .detach_user_permission(user, permission.id)
                .await;
            self.registrar.forget_cached_permissions();
            let removed = result?;
            debug!(user = %user, permission = %permission.name, removed, "Permission revoked from user");
            Ok::<_, AuthzError>(())
        }
        .instrument(spans::assignment("revoke_permission_to", user, &permission_label(permission)))
        .await
        .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    // ------------------------------------------------------------------
    // Checks
    // ------------------------------------------------------------------

    /// True when the user holds the permission, directly or through a role.
    ///
    /// The guard defaults to the permission's own guard for records and ids,
    /// and to the user's default guard for names. A guard that does not apply
    /// to the user, or a permission missing under it, yields `false`.
    pub async fn has_permission<'a>(
        &self,
        user: &UserRef,
        permission: impl Into<PermissionRef<'a>>,
        guard: Option<&str>,
    ) -> AuthzResult<bool> {
        let permission = permission.into();
        let span = spans::check("has_permission", user, &permission_label(permission));
        let granted = self
            .check_permission(user, permission, guard)
            .instrument(span)
            .await?;
        metrics::record_check("has_permission", granted);
        Ok(granted)
    }

    async fn check_permission(
        &self,
        user: &UserRef,
        permission: PermissionRef<'_>,
        guard: Option<&str>,
    ) -> AuthzResult<bool> {
        let set = self.registrar.permissions().await?;
        let default_guard;
        let guard = match guard {
            Some(guard) => guard,
            None => {
                default_guard = self.guards.default_guard_for(&user.model_type);
                match permission {
                    PermissionRef::Name(_) => default_guard.as_str(),
                    PermissionRef::Id(id) => set
                        .get(id)
                        .map_or(default_guard.as_str(), |p| p.guard_name.as_str()),
                    PermissionRef::Record(p) => p.guard_name.as_str(),
                }
            }
        };

        if !self.guards.applies_to(&user.model_type, guard) {
            return Ok(false);
        }
        let Some(found) = set.resolve(permission, guard) else {
            return Ok(false);
        };
        if found.guard_name != guard {
            return Ok(false);
        }

        let backend = self.registrar.backend();
        if backend.user_permission_ids(user).await?.contains(&found.id) {
            return Ok(true);
        }
        let holders = set.role_ids(found.id);
        if holders.is_empty() {
            return Ok(false);
        }
        let user_roles = backend.user_role_ids(user).await?;
        Ok(holders.iter().any(|id| user_roles.contains(id)))
    }

    /// True when the user holds the permission through a direct link.
    pub async fn has_direct_permission<'a>(
        &self,
        user: &UserRef,
        permission: impl Into<PermissionRef<'a>>,
    ) -> AuthzResult<bool> {
        let guard = self.guards.default_guard_for(&user.model_type);
        let set = self.registrar.permissions().await?;
        let Some(found) = set.resolve(permission.into(), &guard) else {
            return Ok(false);
        };
        let granted = self
            .registrar
            .backend()
            .user_permission_ids(user)
            .await?
            .contains(&found.id);
        metrics::record_check("has_direct_permission", granted);
        Ok(granted)
    }

    /// Permissions linked directly to the user, in id order.
    pub async fn direct_permissions(&self, user: &UserRef) -> AuthzResult<Vec<Permission>> {
        let ids = self.registrar.backend().user_permission_ids(user).await?;
        let set = self.registrar.permissions().await?;
        Ok(set.iter().filter(|p| ids.contains(&p.id)).cloned().collect())
    }

    /// Permissions the user holds through roles, in id order.
    pub async fn permissions_via_roles(&self, user: &UserRef) -> AuthzResult<Vec<Permission>> {
        let role_ids: Vec<RoleId> = self.registrar.backend().user_role_ids(user).await?;
        let set = self.registrar.permissions().await?;
        Ok(set.for_roles(&role_ids).cloned().collect())
    }

    /// Direct and role permissions together, without duplicates, in id order.
    pub async fn all_permissions(&self, user: &UserRef) -> AuthzResult<Vec<Permission>> {
        let backend = self.registrar.backend();
        let direct = backend.user_permission_ids(user).await?;
        let role_ids = backend.user_role_ids(user).await?;
        let set = self.registrar.permissions().await?;
        Ok(set
            .iter()
            .filter(|p| {
                direct.contains(&p.id) || set.role_ids(p.id).iter().any(|r| role_ids.contains(r))
            })
            .cloned()
            .collect())
    }
}

fn role_matches(role: &Role, wanted: RoleRef<'_>) -> bool {
    match wanted {
        RoleRef::Name(name) => role.name == name,
        RoleRef::Id(id) => role.id == id,
        RoleRef::Record(r) => role.id == r.id,
    }
}

fn role_label(role: RoleRef<'_>) -> String {
    match role {
        RoleRef::Name(name) => name.to_string(),
        RoleRef::Id(id) => format!("#{id}"),
        RoleRef::Record(r) => r.name.clone(),
    }
}

fn permission_label(permission: PermissionRef<'_>) -> String {
    match permission {
        PermissionRef::Name(name) => name.to_string(),
        PermissionRef::Id(id) => format!("#{id}"),
        PermissionRef::Record(p) => p.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        registrar: Arc<PermissionRegistrar>,
        permissions: PermissionStore,
        roles: RoleStore,
        authz: Authorization,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let registrar = Arc::new(PermissionRegistrar::new(backend.clone()));
        let guards = Arc::new(
            GuardResolver::new("web")
                .with_guard("web", "user")
                .with_guard("api", "user")
                .with_guard("partner", "client"),
        );
        let permissions = PermissionStore::new(registrar.clone(), guards.clone(), "permission");
        let roles = RoleStore::new(registrar.clone(), guards.clone(), permissions.clone(), "role");
        let authz =
            Authorization::new(registrar.clone(), guards, permissions.clone(), roles.clone());
        Fixture {
            backend,
            registrar,
            permissions,
            roles,
            authz,
        }
    }

    #[tokio::test]
    async fn test_permission_through_role() {
        let f = fixture();
        let alice = UserRef::new("user", 1);
        let writer = f.roles.create("writer", None).await.unwrap();
        f.permissions.create("edit", None).await.unwrap();
        f.roles.give_permission_to(&writer, "edit").await.unwrap();

        assert!(!f.authz.has_permission(&alice, "edit", None).await.unwrap());
        f.authz.assign_role(&alice, "writer").await.unwrap();
        assert!(f.authz.has_permission(&alice, "edit", None).await.unwrap());
        assert!(f.authz.has_permission(&alice, "edit", Some("web")).await.unwrap());
        assert!(!f.authz.has_direct_permission(&alice, "edit").await.unwrap());

        f.roles.revoke_permission_to(&writer, "edit").await.unwrap();
        assert!(!f.authz.has_permission(&alice, "edit", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_guard_scoped_check() {
        let f = fixture();
        let alice = UserRef::new("user", 1);
        f.permissions.create("edit", Some("web")).await.unwrap();
        f.authz.give_permission_to(&alice, "edit").await.unwrap();

        assert!(f.authz.has_permission(&alice, "edit", Some("web")).await.unwrap());
        // "edit" does not exist under api.
        assert!(!f.authz.has_permission(&alice, "edit", Some("api")).await.unwrap());
        // partner is not a guard for users.
        assert!(!f.authz.has_permission(&alice, "edit", Some("partner")).await.unwrap());
        // Unknown names are a plain no.
        assert!(!f.authz.has_permission(&alice, "nope", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_direct_permission_and_revoke() {
        let f = fixture();
        let bob = UserRef::new("user", 2);
        let edit = f.permissions.create("edit", Some("api")).await.unwrap();

        // Records keep their own guard, and api applies to users.
        f.authz.give_permission_to(&bob, &edit).await.unwrap();
        assert!(f.authz.has_permission(&bob, &edit, None).await.unwrap());
        assert!(f.authz.has_permission(&bob, edit.id, None).await.unwrap());
        assert_eq!(f.authz.direct_permissions(&bob).await.unwrap(), vec![edit.clone()]);

        f.authz.revoke_permission_to(&bob, &edit).await.unwrap();
        assert!(!f.authz.has_permission(&bob, &edit, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_assign_rejects_foreign_guard() {
        let f = fixture();
        let alice = UserRef::new("user", 1);
        let partner_role = f.roles.create("reseller", Some("partner")).await.unwrap();
        let err = f.authz.assign_role(&alice, &partner_role).await.unwrap_err();
        assert!(matches!(err, AuthzError::GuardMismatch { .. }));

        let partner_perm = f.permissions.create("resell", Some("partner")).await.unwrap();
        let err = f.authz.give_permission_to(&alice, &partner_perm).await.unwrap_err();
        assert!(matches!(err, AuthzError::GuardMismatch { .. }));

        let err = f.authz.assign_role(&alice, "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_role_queries() {
        let f = fixture();
        let alice = UserRef::new("user", 1);
        let writer = f.roles.create("writer", None).await.unwrap();
        let editor = f.roles.create("editor", None).await.unwrap();
        f.roles.create("admin", None).await.unwrap();

        f.authz.assign_roles(&alice, ["writer", "editor"]).await.unwrap();
        f.authz.assign_role(&alice, &writer).await.unwrap();
        assert_eq!(f.authz.roles(&alice).await.unwrap(), vec![writer.clone(), editor.clone()]);
        assert_eq!(f.authz.role_names(&alice).await.unwrap(), vec!["writer", "editor"]);

        assert!(f.authz.has_role(&alice, "writer").await.unwrap());
        assert!(f.authz.has_role(&alice, editor.id).await.unwrap());
        assert!(!f.authz.has_role(&alice, "admin").await.unwrap());
        assert!(!f.authz.has_role(&alice, "ghost").await.unwrap());
        assert!(f.authz.has_any_role(&alice, ["admin", "writer"]).await.unwrap());
        assert!(!f.authz.has_all_roles(&alice, ["admin", "writer"]).await.unwrap());
        assert!(f.authz.has_all_roles(&alice, ["editor", "writer"]).await.unwrap());

        f.authz.remove_role(&alice, "writer").await.unwrap();
        assert!(!f.authz.has_role(&alice, &writer).await.unwrap());
        f.authz.remove_role(&alice, "writer").await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_roles() {
        let f = fixture();
        let alice = UserRef::new("user", 1);
        f.roles.create("writer", None).await.unwrap();
        f.roles.create("editor", None).await.unwrap();
        f.roles.create("admin", None).await.unwrap();
        f.authz.assign_roles(&alice, ["writer", "editor"]).await.unwrap();

        f.authz.sync_roles(&alice, ["editor", "admin"]).await.unwrap();
        assert_eq!(f.authz.role_names(&alice).await.unwrap(), vec!["editor", "admin"]);

        let err = f.authz.sync_roles(&alice, ["writer", "ghost"]).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(f.authz.role_names(&alice).await.unwrap(), vec!["editor", "admin"]);
    }

    #[tokio::test]
    async fn test_permission_listings() {
        let f = fixture();
        let alice = UserRef::new("user", 1);
        let edit = f.permissions.create("edit", None).await.unwrap();
        let publish = f.permissions.create("publish", None).await.unwrap();
        let delete = f.permissions.create("delete", None).await.unwrap();
        let writer = f.roles.create("writer", None).await.unwrap();
        f.roles.give_permissions_to(&writer, [&edit, &publish]).await.unwrap();
        f.authz.assign_role(&alice, &writer).await.unwrap();
        f.authz.give_permission_to(&alice, &edit).await.unwrap();
        f.authz.give_permission_to(&alice, &delete).await.unwrap();

        assert_eq!(
            f.authz.permissions_via_roles(&alice).await.unwrap(),
            vec![edit.clone(), publish.clone()]
        );
        assert_eq!(
            f.authz.direct_permissions(&alice).await.unwrap(),
            vec![edit.clone(), delete.clone()]
        );
        assert_eq!(
            f.authz.all_permissions(&alice).await.unwrap(),
            vec![edit, publish, delete]
        );
    }

    #[tokio::test]
    async fn test_deleted_role_loses_grants() {
        let f = fixture();
        let alice = UserRef::new("user", 1);
        let writer = f.roles.create("writer", None).await.unwrap();
        f.permissions.create("edit", None).await.unwrap();
        f.roles.give_permission_to(&writer, "edit").await.unwrap();
        f.authz.assign_role(&alice, &writer).await.unwrap();
        assert!(f.authz.has_permission(&alice, "edit", None).await.unwrap());

        f.roles.delete(&writer).await.unwrap();
        assert!(f.authz.roles(&alice).await.unwrap().is_empty());
        assert!(!f.authz.has_permission(&alice, "edit", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_storage_failures_surface_from_checks() {
        let f = fixture();
        let alice = UserRef::new("user", 1);
        let writer = f.roles.create("writer", None).await.unwrap();
        f.permissions.create("edit", None).await.unwrap();
        f.roles.give_permission_to(&writer, "edit").await.unwrap();
        f.authz.assign_role(&alice, &writer).await.unwrap();
        assert!(f.authz.has_permission(&alice, "edit", None).await.unwrap());
        assert!(f.registrar.is_warm());

        f.backend.set_available(false);

        // A warm cache still needs the user's links from storage.
        let err = f.authz.has_permission(&alice, "edit", None).await.unwrap_err();
        assert!(matches!(err, AuthzError::Storage(_)));
        let err = f.authz.has_role(&alice, "writer").await.unwrap_err();
        assert!(matches!(err, AuthzError::Storage(_)));
        let err = f.authz.has_any_role(&alice, ["writer"]).await.unwrap_err();
        assert!(matches!(err, AuthzError::Storage(_)));
        let err = f.authz.assign_role(&alice, &writer).await.unwrap_err();
        assert!(matches!(err, AuthzError::Storage(_)));
        let err = f.authz.sync_roles(&alice, [&writer]).await.unwrap_err();
        assert!(matches!(err, AuthzError::Storage(_)));
        let err = f.authz.revoke_permission_to(&alice, "edit").await.unwrap_err();
        assert!(matches!(err, AuthzError::Storage(_)));

        f.registrar.forget_cached_permissions();
        let err = f.roles.has_permission_to(&writer, "edit").await.unwrap_err();
        assert!(matches!(err, AuthzError::Storage(_)));
        assert!(!f.registrar.is_warm());

        // Nothing was recorded as a denial while storage was down.
        f.backend.set_available(true);
        assert!(f.authz.has_permission(&alice, "edit", None).await.unwrap());
        assert!(f.roles.has_permission_to(&writer, "edit").await.unwrap());
        assert!(f.authz.has_role(&alice, "writer").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_role_sync_is_counted() {
        metrics::init();
        let storage_errors = || {
            metrics::ERRORS
                .get()
                .map_or(0, |c| c.with_label_values(&["storage_error"]).get())
        };

        let f = fixture();
        let alice = UserRef::new("user", 1);
        f.roles.create("writer", None).await.unwrap();
        f.backend.set_available(false);

        let before = storage_errors();
        let err = f.authz.sync_roles(&alice, ["writer"]).await.unwrap_err();
        assert!(matches!(err, AuthzError::Storage(_)));
        assert!(storage_errors() > before);
    }
}
