//! Permission store.
//!
//! Lookups go through the registrar; only create and delete touch storage
//! directly, and both invalidate the registrar once the write is done.

use crate::error::{AuthzError, AuthzResult};
use crate::guard::GuardResolver;
use crate::metrics;
use crate::model::{EntityKind, Permission, PermissionId, PermissionRef, Role, UserRef};
use crate::registrar::PermissionRegistrar;
use crate::telemetry::spans;
use std::sync::Arc;
use tracing::{Instrument, debug, warn};

/// Create, find and delete permissions scoped by (name, guard).
#[derive(Debug, Clone)]
pub struct PermissionStore {
    registrar: Arc<PermissionRegistrar>,
    guards: Arc<GuardResolver>,
    model_type: String,
}

impl PermissionStore {
    /// `model_type` is the tag used to resolve the default guard for new permissions.
    pub fn new(
        registrar: Arc<PermissionRegistrar>,
        guards: Arc<GuardResolver>,
        model_type: impl Into<String>,
    ) -> Self {
        Self {
            registrar,
            guards,
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

    /// Create a permission.
    ///
    /// Fails with [`AuthzError::AlreadyExists`] if (name, guard) is taken.
    pub async fn create(&self, name: &str, guard: Option<&str>) -> AuthzResult<Permission> {
        let guard = self.guard_or_default(guard);
        self.insert(name, &guard)
            .await
            .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    async fn insert(&self, name: &str, guard: &str) -> AuthzResult<Permission> {
        let span = spans::mutation("create_permission", name, guard);
        self.do_insert(name, guard).instrument(span).await
    }

    async fn do_insert(&self, name: &str, guard: &str) -> AuthzResult<Permission> {
        // Fast path only; the storage constraint is what actually decides.
        if self.registrar.permissions().await?.find(name, guard).is_some() {
            return Err(AuthzError::AlreadyExists {
                kind: EntityKind::Permission,
                name: name.to_string(),
                guard: guard.to_string(),
            });
        }

        let result = self.registrar.backend().insert_permission(name, guard).await;
        // A collision means our view was stale as well.
        self.registrar.forget_cached_permissions();
        let permission = result?;
        debug!(id = %permission.id, "Permission created");
        Ok(permission)
    }

    /// Find a permission by name under `guard` (or the default guard).
    pub async fn find_by_name(&self, name: &str, guard: Option<&str>) -> AuthzResult<Permission> {
        let guard = self.guard_or_default(guard);
        let set = self.registrar.permissions().await?;
        set.find(name, &guard)
            .cloned()
            .ok_or_else(|| AuthzError::not_found(EntityKind::Permission, name, &guard))
            .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    pub async fn find_by_id(&self, id: PermissionId) -> AuthzResult<Permission> {
        let set = self.registrar.permissions().await?;
        set.get(id)
            .cloned()
            .ok_or(AuthzError::UnknownId {
                kind: EntityKind::Permission,
                id: id.0,
            })
            .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    /// Return the permission for (name, guard), creating it if needed.
    ///
    /// Concurrent callers racing on the same pair all get the same record:
    /// whoever loses the insert picks up the winner's row from storage.
    pub async fn find_or_create(&self, name: &str, guard: Option<&str>) -> AuthzResult<Permission> {
        let guard = self.guard_or_default(guard);
        if let Some(existing) = self.registrar.permissions().await?.find(name, &guard) {
            return Ok(existing.clone());
        }

        let result = match self.insert(name, &guard).await {
            Err(AuthzError::AlreadyExists { .. }) => {
                warn!(name = %name, guard = %guard, "Lost permission creation race, using existing record");
                self.registrar
                    .backend()
                    .find_permission(name, &guard)
                    .await
                    .map_err(AuthzError::from)
                    .and_then(|found| {
                        found.ok_or_else(|| {
                            AuthzError::not_found(EntityKind::Permission, name, &guard)
                        })
                    })
            }
            other => other,
        };
        result.inspect_err(|e| metrics::record_error(e.error_code()))
    }

    /// Delete a permission and every link to it.
    ///
    /// Returns false if it was already gone.
    pub async fn delete(&self, permission: &Permission) -> AuthzResult<bool> {
        let span = spans::mutation("delete_permission", &permission.name, &permission.guard_name);
        self.do_delete(permission)
            .instrument(span)
            .await
            .inspect_err(|e| metrics::record_error(e.error_code()))
    }

    async fn do_delete(&self, permission: &Permission) -> AuthzResult<bool> {
        let result = self.registrar.backend().delete_permission(permission.id).await;
        self.registrar.forget_cached_permissions();
        let deleted = result?;
        debug!(id = %permission.id, deleted, "Permission deleted");
        Ok(deleted)
    }

    /// Every permission, in id order.
    pub async fn all(&self) -> AuthzResult<Vec<Permission>> {
        let set = self.registrar.permissions().await?;
        Ok(set.iter().cloned().collect())
    }

    pub async fn for_guard(&self, guard: &str) -> AuthzResult<Vec<Permission>> {
        let set = self.registrar.permissions().await?;
        Ok(set.for_guard(guard).cloned().collect())
    }

    /// Roles holding the permission.
    pub async fn roles(&self, permission: &Permission) -> AuthzResult<Vec<Role>> {
        let set = self.registrar.permissions().await?;
        let role_ids = set.role_ids(permission.id);
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        let roles = self.registrar.backend().list_roles().await?;
        Ok(roles
            .into_iter()
            .filter(|r| role_ids.contains(&r.id))
            .collect())
    }

    /// Users holding the permission directly.
    ///
    /// Only users of the model type served by the permission's guard are returned.
    pub async fn users(&self, permission: &Permission) -> AuthzResult<Vec<UserRef>> {
        let users = self
            .registrar
            .backend()
            .permission_users(permission.id)
            .await?;
        Ok(match self.guards.model_for_guard(&permission.guard_name) {
            Some(model) => users.into_iter().filter(|u| u.model_type == model).collect(),
            None => users,
        })
    }

    /// Resolve a reference to a stored permission. Names resolve under `guard`.
    ///
    /// Does not check the guard of records or ids; callers decide what
    /// guard agreement they need.
    pub(crate) async fn resolve(
        &self,
        permission: PermissionRef<'_>,
        guard: &str,
    ) -> AuthzResult<Permission> {
        let set = self.registrar.permissions().await?;
        match set.resolve(permission, guard) {
            Some(found) => Ok(found.clone()),
            None => Err(match permission {
                PermissionRef::Name(name) => {
                    AuthzError::not_found(EntityKind::Permission, name, guard)
                }
                PermissionRef::Id(id) => AuthzError::UnknownId {
                    kind: EntityKind::Permission,
                    id: id.0,
                },
                PermissionRef::Record(p) => AuthzError::UnknownId {
                    kind: EntityKind::Permission,
                    id: p.id.0,
                },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBackend, PermissionBackend};

    fn store() -> (Arc<MemoryBackend>, PermissionStore) {
        let backend = Arc::new(MemoryBackend::new());
        let registrar = Arc::new(PermissionRegistrar::new(backend.clone()));
        let guards = Arc::new(
            GuardResolver::new("web")
                .with_guard("web", "user")
                .with_guard("api", "user"),
        );
        (backend, PermissionStore::new(registrar, guards, "permission"))
    }

    #[tokio::test]
    async fn test_create_find_scenario() {
        let (_, store) = store();
        let created = store.create("edit-articles", Some("web")).await.unwrap();

        let err = store
            .create("edit-articles", Some("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::AlreadyExists { .. }));

        let found = store
            .find_by_name("edit-articles", Some("web"))
            .await
            .unwrap();
        assert_eq!(found, created);

        let err = store
            .find_by_name("edit-articles", Some("api"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_default_guard_applies() {
        let (_, store) = store();
        let p = store.create("publish", None).await.unwrap();
        assert_eq!(p.guard_name, "web");
        assert_eq!(store.find_by_name("publish", None).await.unwrap(), p);
    }

    #[tokio::test]
    async fn test_find_or_create_is_idempotent() {
        let (_, store) = store();
        let a = store.find_or_create("edit", Some("api")).await.unwrap();
        let b = store.find_or_create("edit", Some("api")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_or_create_recovers_from_external_insert() {
        let (backend, store) = store();
        // Warm the cache, then insert behind its back as another process would.
        assert!(store.all().await.unwrap().is_empty());
        let external = backend.insert_permission("edit", "web").await.unwrap();

        let found = store.find_or_create("edit", Some("web")).await.unwrap();
        assert_eq!(found, external);
    }

    #[tokio::test]
    async fn test_create_invalidates_cache() {
        let (_, store) = store();
        assert!(store.all().await.unwrap().is_empty());
        store.create("edit", None).await.unwrap();
        assert_eq!(store.all().await.unwrap().len(), 1);
        store.create("edit", Some("api")).await.unwrap();
        assert_eq!(store.for_guard("api").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_from_cache() {
        let (backend, store) = store();
        let user = UserRef::new("user", 1);
        let p = store.create("edit", None).await.unwrap();
        backend.attach_user_permission(&user, p.id).await.unwrap();
        assert_eq!(store.users(&p).await.unwrap(), vec![user]);

        assert!(store.delete(&p).await.unwrap());
        assert!(store.find_by_id(p.id).await.unwrap_err().is_not_found());
        assert!(!store.delete(&p).await.unwrap());
    }

    #[tokio::test]
    async fn test_roles_of_permission() {
        let (backend, store) = store();
        let p = store.create("edit", None).await.unwrap();
        let writer = backend.insert_role("writer", "web").await.unwrap();
        backend.insert_role("reader", "web").await.unwrap();
        backend.attach_role_permission(writer.id, p.id).await.unwrap();
        store.registrar.forget_cached_permissions();

        assert_eq!(store.roles(&p).await.unwrap(), vec![writer]);
    }

    #[tokio::test]
    async fn test_users_filtered_by_guard_model() {
        let (backend, store) = store();
        let p = store.create("edit", None).await.unwrap();
        backend
            .attach_user_permission(&UserRef::new("user", 1), p.id)
            .await
            .unwrap();
        backend
            .attach_user_permission(&UserRef::new("client", 2), p.id)
            .await
            .unwrap();
        assert_eq!(store.users(&p).await.unwrap(), vec![UserRef::new("user", 1)]);
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let (backend, store) = store();
        backend.set_available(false);
        let err = store.create("edit", None).await.unwrap_err();
        assert!(matches!(err, AuthzError::Storage(_)));
    }
}
