//! Permission, role and user reference models.

use std::fmt;

/// Storage-assigned permission id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PermissionId(pub i64);

/// Storage-assigned role id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoleId(pub i64);

impl fmt::Display for PermissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named capability scoped to a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub guard_name: String,
    /// Unix timestamp of creation.
    pub created_at: i64,
    /// Unix timestamp of the last change.
    pub updated_at: i64,
}

/// A named bundle of permissions scoped to a guard.
///
/// The permission set itself lives in the role↔permission link collection
/// and is read through the registrar, see [`crate::RoleStore::permissions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub guard_name: String,
    /// Unix timestamp of creation.
    pub created_at: i64,
    /// Unix timestamp of the last change, bumped when the permission set changes.
    pub updated_at: i64,
}

/// Reference to a user-like entity holding roles and permissions.
///
/// The model type decides which guards apply to the user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserRef {
    pub model_type: String,
    pub id: i64,
}

impl UserRef {
    pub fn new(model_type: impl Into<String>, id: i64) -> Self {
        Self {
            model_type: model_type.into(),
            id,
        }
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.model_type, self.id)
    }
}

/// Which kind of record an operation or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Permission,
    Role,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Permission => "permission",
            EntityKind::Role => "role",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A permission given by record, id or name.
///
/// Names are resolved under the guard of whatever the permission is being
/// attached to.
#[derive(Debug, Clone, Copy)]
pub enum PermissionRef<'a> {
    Record(&'a Permission),
    Id(PermissionId),
    Name(&'a str),
}

impl<'a> From<&'a Permission> for PermissionRef<'a> {
    fn from(permission: &'a Permission) -> Self {
        PermissionRef::Record(permission)
    }
}

impl From<PermissionId> for PermissionRef<'_> {
    fn from(id: PermissionId) -> Self {
        PermissionRef::Id(id)
    }
}

impl<'a> From<&'a str> for PermissionRef<'a> {
    fn from(name: &'a str) -> Self {
        PermissionRef::Name(name)
    }
}

impl<'a> From<&'a String> for PermissionRef<'a> {
    fn from(name: &'a String) -> Self {
        PermissionRef::Name(name.as_str())
    }
}

/// A role given by record, id or name.
#[derive(Debug, Clone, Copy)]
pub enum RoleRef<'a> {
    Record(&'a Role),
    Id(RoleId),
    Name(&'a str),
}

impl<'a> From<&'a Role> for RoleRef<'a> {
    fn from(role: &'a Role) -> Self {
        RoleRef::Record(role)
    }
}

impl From<RoleId> for RoleRef<'_> {
    fn from(id: RoleId) -> Self {
        RoleRef::Id(id)
    }
}

impl<'a> From<&'a str> for RoleRef<'a> {
    fn from(name: &'a str) -> Self {
        RoleRef::Name(name)
    }
}

impl<'a> From<&'a String> for RoleRef<'a> {
    fn from(name: &'a String) -> Self {
        RoleRef::Name(name.as_str())
    }
}

/// Current unix time in seconds.
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
