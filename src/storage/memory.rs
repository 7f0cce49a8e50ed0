//! In-process storage backend.
//!
//! All tables sit behind one `RwLock`; every write holds the lock for its
//! whole check-and-modify, which is what makes the (name, guard) uniqueness
//! check atomic.

use super::{PermissionBackend, PermissionRecord, StorageError};
use crate::model::{EntityKind, Permission, PermissionId, Role, RoleId, UserRef, now};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Tables {
    next_permission_id: i64,
    next_role_id: i64,
    permissions: BTreeMap<PermissionId, Permission>,
    roles: BTreeMap<RoleId, Role>,
    role_permissions: BTreeSet<(RoleId, PermissionId)>,
    user_roles: BTreeSet<(UserRef, RoleId)>,
    user_permissions: BTreeSet<(UserRef, PermissionId)>,
}

impl Tables {
    fn require_permission(&self, id: PermissionId) -> Result<(), StorageError> {
        if self.permissions.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::MissingRecord {
                kind: EntityKind::Permission,
                id: id.0,
            })
        }
    }

    fn require_role(&self, id: RoleId) -> Result<(), StorageError> {
        if self.roles.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::MissingRecord {
                kind: EntityKind::Role,
                id: id.0,
            })
        }
    }

    fn touch_role(&mut self, id: RoleId) {
        if let Some(role) = self.roles.get_mut(&id) {
            role.updated_at = now();
        }
    }
}

/// Storage backend keeping every table in memory.
#[derive(Debug)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
    available: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable every call fails with
    /// [`StorageError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("memory backend offline".into()))
        }
    }
}

#[async_trait]
impl PermissionBackend for MemoryBackend {
    async fn insert_permission(&self, name: &str, guard: &str) -> Result<Permission, StorageError> {
        self.check()?;
        let mut t = self.tables.write();
        if t
            .permissions
            .values()
            .any(|p| p.name == name && p.guard_name == guard)
        {
            return Err(StorageError::UniqueViolation {
                kind: EntityKind::Permission,
                name: name.to_string(),
                guard: guard.to_string(),
            });
        }
        t.next_permission_id += 1;
        let ts = now();
        let permission = Permission {
            id: PermissionId(t.next_permission_id),
            name: name.to_string(),
            guard_name: guard.to_string(),
            created_at: ts,
            updated_at: ts,
        };
        t.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn find_permission(
        &self,
        name: &str,
        guard: &str,
    ) -> Result<Option<Permission>, StorageError> {
        self.check()?;
        let t = self.tables.read();
        Ok(t
            .permissions
            .values()
            .find(|p| p.name == name && p.guard_name == guard)
            .cloned())
    }

    async fn delete_permission(&self, id: PermissionId) -> Result<bool, StorageError> {
        self.check()?;
        let mut t = self.tables.write();
        if t.permissions.remove(&id).is_none() {
            return Ok(false);
        }
        let touched: Vec<RoleId> = t
            .role_permissions
            .iter()
            .filter(|(_, p)| *p == id)
            .map(|(r, _)| *r)
            .collect();
        t.role_permissions.retain(|(_, p)| *p != id);
        t.user_permissions.retain(|(_, p)| *p != id);
        for role in touched {
            t.touch_role(role);
        }
        Ok(true)
    }

    async fn load_permissions(&self) -> Result<Vec<PermissionRecord>, StorageError> {
        self.check()?;
        let t = self.tables.read();
        Ok(t
            .permissions
            .values()
            .map(|p| PermissionRecord {
                permission: p.clone(),
                role_ids: t
                    .role_permissions
                    .iter()
                    .filter(|(_, pid)| *pid == p.id)
                    .map(|(rid, _)| *rid)
                    .collect(),
            })
            .collect())
    }

    async fn insert_role(&self, name: &str, guard: &str) -> Result<Role, StorageError> {
        self.check()?;
        let mut t = self.tables.write();
        if t
            .roles
            .values()
            .any(|r| r.name == name && r.guard_name == guard)
        {
            return Err(StorageError::UniqueViolation {
                kind: EntityKind::Role,
                name: name.to_string(),
                guard: guard.to_string(),
            });
        }
        t.next_role_id += 1;
        let ts = now();
        let role = Role {
            id: RoleId(t.next_role_id),
            name: name.to_string(),
            guard_name: guard.to_string(),
            created_at: ts,
            updated_at: ts,
        };
        t.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn find_role(&self, name: &str, guard: &str) -> Result<Option<Role>, StorageError> {
        self.check()?;
        let t = self.tables.read();
        Ok(t
            .roles
            .values()
            .find(|r| r.name == name && r.guard_name == guard)
            .cloned())
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StorageError> {
        self.check()?;
        Ok(self.tables.read().roles.get(&id).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StorageError> {
        self.check()?;
        Ok(self.tables.read().roles.values().cloned().collect())
    }

    async fn delete_role(&self, id: RoleId) -> Result<bool, StorageError> {
        self.check()?;
        let mut t = self.tables.write();
        if t.roles.remove(&id).is_none() {
            return Ok(false);
        }
        t.role_permissions.retain(|(r, _)| *r != id);
        t.user_roles.retain(|(_, r)| *r != id);
        Ok(true)
    }

    async fn attach_role_permission(
        &self,
        role: RoleId,
        permission: PermissionId,
    ) -> Result<bool, StorageError> {
        self.check()?;
        let mut t = self.tables.write();
        t.require_role(role)?;
        t.require_permission(permission)?;
        let created = t.role_permissions.insert((role, permission));
        if created {
            t.touch_role(role);
        }
        Ok(created)
    }

    async fn detach_role_permission(
        &self,
        role: RoleId,
        permission: PermissionId,
    ) -> Result<bool, StorageError> {
        self.check()?;
        let mut t = self.tables.write();
        let removed = t.role_permissions.remove(&(role, permission));
        if removed {
            t.touch_role(role);
        }
        Ok(removed)
    }

    async fn attach_user_role(&self, user: &UserRef, role: RoleId) -> Result<bool, StorageError> {
        self.check()?;
        let mut t = self.tables.write();
        t.require_role(role)?;
        Ok(t.user_roles.insert((user.clone(), role)))
    }

    async fn detach_user_role(&self, user: &UserRef, role: RoleId) -> Result<bool, StorageError> {
        self.check()?;
        Ok(self.tables.write().user_roles.remove(&(user.clone(), role)))
    }

    async fn user_role_ids(&self, user: &UserRef) -> Result<Vec<RoleId>, StorageError> {
        self.check()?;
        let t = self.tables.read();
        Ok(t
            .user_roles
            .iter()
            .filter(|(u, _)| u == user)
            .map(|(_, r)| *r)
            .collect())
    }

    async fn role_users(&self, role: RoleId) -> Result<Vec<UserRef>, StorageError> {
        self.check()?;
        let t = self.tables.read();
        Ok(t
            .user_roles
            .iter()
            .filter(|(_, r)| *r == role)
            .map(|(u, _)| u.clone())
            .collect())
    }

    async fn attach_user_permission(
        &self,
        user: &UserRef,
        permission: PermissionId,
    ) -> Result<bool, StorageError> {
        self.check()?;
        let mut t = self.tables.write();
        t.require_permission(permission)?;
        Ok(t.user_permissions.insert((user.clone(), permission)))
    }

    async fn detach_user_permission(
        &self,
        user: &UserRef,
        permission: PermissionId,
    ) -> Result<bool, StorageError> {
        self.check()?;
        Ok(self
            .tables
            .write()
            .user_permissions
            .remove(&(user.clone(), permission)))
    }

    async fn user_permission_ids(&self, user: &UserRef) -> Result<Vec<PermissionId>, StorageError> {
        self.check()?;
        let t = self.tables.read();
        Ok(t
            .user_permissions
            .iter()
            .filter(|(u, _)| u == user)
            .map(|(_, p)| *p)
            .collect())
    }

    async fn permission_users(
        &self,
        permission: PermissionId,
    ) -> Result<Vec<UserRef>, StorageError> {
        self.check()?;
        let t = self.tables.read();
        Ok(t
            .user_permissions
            .iter()
            .filter(|(_, p)| *p == permission)
            .map(|(u, _)| u.clone())
            .collect())
    }
}
