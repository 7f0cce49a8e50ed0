//! Unified error handling for rolegate.
//!
//! Management operations (create, find, assign) return [`AuthzResult`].
//! Authorization checks return `AuthzResult<bool>` and only ever fail with
//! [`AuthzError::Storage`]; a missing role or permission is simply `false`.

use crate::model::EntityKind;
use crate::storage::StorageError;
use thiserror::Error;

// ============================================================================
// Authorization Errors
// ============================================================================

/// Errors surfaced by the permission and role stores and the assignment layer.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("a {kind} `{name}` already exists for guard `{guard}`")]
    AlreadyExists {
        kind: EntityKind,
        name: String,
        guard: String,
    },

    #[error("there is no {kind} named `{name}` for guard `{guard}`")]
    NotFound {
        kind: EntityKind,
        name: String,
        guard: String,
    },

    #[error("there is no {kind} with id {id}")]
    UnknownId { kind: EntityKind, id: i64 },

    #[error("guard mismatch: expected one of [{expected}], got `{found}`")]
    GuardMismatch { expected: String, found: String },

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl AuthzError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "already_exists",
            Self::NotFound { .. } => "not_found",
            Self::UnknownId { .. } => "unknown_id",
            Self::GuardMismatch { .. } => "guard_mismatch",
            Self::Storage(_) => "storage_error",
        }
    }

    pub(crate) fn not_found(kind: EntityKind, name: &str, guard: &str) -> Self {
        Self::NotFound {
            kind,
            name: name.to_string(),
            guard: guard.to_string(),
        }
    }

    pub(crate) fn guard_mismatch(expected: &[String], found: &str) -> Self {
        Self::GuardMismatch {
            expected: expected.join(", "),
            found: found.to_string(),
        }
    }

    /// True for "the record isn't there" failures of either flavour.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::UnknownId { .. })
    }
}

impl From<StorageError> for AuthzError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UniqueViolation { kind, name, guard } => {
                AuthzError::AlreadyExists { kind, name, guard }
            }
            StorageError::MissingRecord { kind, id } => AuthzError::UnknownId { kind, id },
            other => AuthzError::Storage(other),
        }
    }
}

/// Result type for store and assignment operations.
pub type AuthzResult<T> = Result<T, AuthzError>;
