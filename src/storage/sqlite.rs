//! SQLite storage backend.
//!
//! Tables are named after [`CollectionNames`] and created on connect with
//! `CREATE TABLE IF NOT EXISTS`. The `UNIQUE (name, guard_name)` constraints
//! are the final arbiter for concurrent creation; a violation is reported as
//! [`StorageError::UniqueViolation`].

use super::{PermissionBackend, PermissionRecord, StorageError};
use crate::config::CollectionNames;
use crate::model::{EntityKind, Permission, PermissionId, Role, RoleId, UserRef, now};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

type RecordRow = (i64, String, String, i64, i64);

/// Storage backend over an SQLx SQLite pool.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    tables: CollectionNames,
}

impl SqliteBackend {
    /// Connection acquire timeout - a wedged pool surfaces as an error instead of hanging.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connect with the default collection names.
    pub async fn connect(path: &str) -> Result<Self, StorageError> {
        Self::connect_with(path, CollectionNames::default()).await
    }

    /// Connect and create any missing tables.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub async fn connect_with(path: &str, tables: CollectionNames) -> Result<Self, StorageError> {
        let pool = if path == ":memory:" {
            // Uniquely named shared-cache database per call, so parallel
            // tests never see each other's tables.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:rolegate-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .foreign_keys(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(SqliteJournalMode::Wal)
                .foreign_keys(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Permission database connected");

        let backend = Self { pool, tables };
        backend.create_tables().await?;
        Ok(backend)
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_tables(&self) -> Result<(), StorageError> {
        let CollectionNames {
            permissions,
            roles,
            role_has_permissions,
            model_has_roles,
            model_has_permissions,
        } = &self.tables;

        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {permissions} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    guard_name TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    UNIQUE (name, guard_name)
                )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {roles} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    guard_name TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    UNIQUE (name, guard_name)
                )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {role_has_permissions} (
                    role_id INTEGER NOT NULL REFERENCES {roles}(id) ON DELETE CASCADE,
                    permission_id INTEGER NOT NULL REFERENCES {permissions}(id) ON DELETE CASCADE,
                    PRIMARY KEY (role_id, permission_id)
                )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {model_has_roles} (
                    model_type TEXT NOT NULL,
                    model_id INTEGER NOT NULL,
                    role_id INTEGER NOT NULL REFERENCES {roles}(id) ON DELETE CASCADE,
                    PRIMARY KEY (model_type, model_id, role_id)
                )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {model_has_permissions} (
                    model_type TEXT NOT NULL,
                    model_id INTEGER NOT NULL,
                    permission_id INTEGER NOT NULL REFERENCES {permissions}(id) ON DELETE CASCADE,
                    PRIMARY KEY (model_type, model_id, permission_id)
                )"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {role_has_permissions}_permission_idx
                    ON {role_has_permissions} (permission_id)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {model_has_roles}_role_idx
                    ON {model_has_roles} (role_id)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {model_has_permissions}_permission_idx
                    ON {model_has_permissions} (permission_id)"
            ),
        ];

        for sql in &statements {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        info!("Permission tables checked/created");
        Ok(())
    }

    async fn insert_record(
        &self,
        kind: EntityKind,
        table: &str,
        name: &str,
        guard: &str,
    ) -> Result<(i64, i64), StorageError> {
        let ts = now();
        let sql = format!(
            "INSERT INTO {table} (name, guard_name, created_at, updated_at) VALUES (?, ?, ?, ?)"
        );
        let result = sqlx::query(&sql)
            .bind(name)
            .bind(guard)
            .bind(ts)
            .bind(ts)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                // Convert UNIQUE constraint violation to UniqueViolation
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_unique_violation()
                {
                    return StorageError::UniqueViolation {
                        kind,
                        name: name.to_string(),
                        guard: guard.to_string(),
                    };
                }
                StorageError::from(e)
            })?;
        Ok((result.last_insert_rowid(), ts))
    }

    async fn find_record(
        &self,
        table: &str,
        name: &str,
        guard: &str,
    ) -> Result<Option<RecordRow>, StorageError> {
        let sql = format!(
            "SELECT id, name, guard_name, created_at, updated_at FROM {table}
             WHERE name = ? AND guard_name = ?"
        );
        Ok(sqlx::query_as::<_, RecordRow>(&sql)
            .bind(name)
            .bind(guard)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn exists(
        tx: &mut Transaction<'_, Sqlite>,
        table: &str,
        kind: EntityKind,
        id: i64,
    ) -> Result<(), StorageError> {
        let sql = format!("SELECT 1 FROM {table} WHERE id = ?");
        let found = sqlx::query_scalar::<_, i64>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        match found {
            Some(_) => Ok(()),
            None => Err(StorageError::MissingRecord { kind, id }),
        }
    }

    async fn touch_role(
        tx: &mut Transaction<'_, Sqlite>,
        table: &str,
        role: RoleId,
    ) -> Result<(), StorageError> {
        let sql = format!("UPDATE {table} SET updated_at = ? WHERE id = ?");
        sqlx::query(&sql)
            .bind(now())
            .bind(role.0)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn user_links(
        &self,
        table: &str,
        column: &str,
        id: i64,
    ) -> Result<Vec<UserRef>, StorageError> {
        let sql = format!(
            "SELECT model_type, model_id FROM {table} WHERE {column} = ? ORDER BY model_type, model_id"
        );
        let rows = sqlx::query_as::<_, (String, i64)>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(model_type, id)| UserRef { model_type, id })
            .collect())
    }
}

fn permission_from_row((id, name, guard_name, created_at, updated_at): RecordRow) -> Permission {
    Permission {
        id: PermissionId(id),
        name,
        guard_name,
        created_at,
        updated_at,
    }
}

fn role_from_row((id, name, guard_name, created_at, updated_at): RecordRow) -> Role {
    Role {
        id: RoleId(id),
        name,
        guard_name,
        created_at,
        updated_at,
    }
}

#[async_trait]
impl PermissionBackend for SqliteBackend {
    async fn insert_permission(&self, name: &str, guard: &str) -> Result<Permission, StorageError> {
        let (id, ts) = self
            .insert_record(EntityKind::Permission, &self.tables.permissions, name, guard)
            .await?;
        Ok(Permission {
            id: PermissionId(id),
            name: name.to_string(),
            guard_name: guard.to_string(),
            created_at: ts,
            updated_at: ts,
        })
    }

    async fn find_permission(
        &self,
        name: &str,
        guard: &str,
    ) -> Result<Option<Permission>, StorageError> {
        Ok(self
            .find_record(&self.tables.permissions, name, guard)
            .await?
            .map(permission_from_row))
    }

    async fn delete_permission(&self, id: PermissionId) -> Result<bool, StorageError> {
        let t = &self.tables;
        let mut tx = self.pool.begin().await?;

        // Bump every role losing this permission before the links go away.
        let sql = format!(
            "UPDATE {} SET updated_at = ? WHERE id IN (SELECT role_id FROM {} WHERE permission_id = ?)",
            t.roles, t.role_has_permissions
        );
        sqlx::query(&sql)
            .bind(now())
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        // Explicit link cleanup; ON DELETE CASCADE covers the same rows when
        // foreign keys are enforced.
        for link in [&t.role_has_permissions, &t.model_has_permissions] {
            let sql = format!("DELETE FROM {link} WHERE permission_id = ?");
            sqlx::query(&sql).bind(id.0).execute(&mut *tx).await?;
        }

        let sql = format!("DELETE FROM {} WHERE id = ?", t.permissions);
        let result = sqlx::query(&sql).bind(id.0).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_permissions(&self) -> Result<Vec<PermissionRecord>, StorageError> {
        // One read transaction so records and links come from the same snapshot.
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT id, name, guard_name, created_at, updated_at FROM {} ORDER BY id",
            self.tables.permissions
        );
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .fetch_all(&mut *tx)
            .await?;

        let sql = format!(
            "SELECT permission_id, role_id FROM {} ORDER BY permission_id, role_id",
            self.tables.role_has_permissions
        );
        let links = sqlx::query_as::<_, (i64, i64)>(&sql)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut by_permission: HashMap<i64, Vec<RoleId>> = HashMap::new();
        for (permission_id, role_id) in links {
            by_permission
                .entry(permission_id)
                .or_default()
                .push(RoleId(role_id));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let role_ids = by_permission.remove(&row.0).unwrap_or_default();
                PermissionRecord {
                    permission: permission_from_row(row),
                    role_ids,
                }
            })
            .collect())
    }

    async fn insert_role(&self, name: &str, guard: &str) -> Result<Role, StorageError> {
        let (id, ts) = self
            .insert_record(EntityKind::Role, &self.tables.roles, name, guard)
            .await?;
        Ok(Role {
            id: RoleId(id),
            name: name.to_string(),
            guard_name: guard.to_string(),
            created_at: ts,
            updated_at: ts,
        })
    }

    async fn find_role(&self, name: &str, guard: &str) -> Result<Option<Role>, StorageError> {
        Ok(self
            .find_record(&self.tables.roles, name, guard)
            .await?
            .map(role_from_row))
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StorageError> {
        let sql = format!(
            "SELECT id, name, guard_name, created_at, updated_at FROM {} WHERE id = ?",
            self.tables.roles
        );
        Ok(sqlx::query_as::<_, RecordRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(role_from_row))
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StorageError> {
        let sql = format!(
            "SELECT id, name, guard_name, created_at, updated_at FROM {} ORDER BY id",
            self.tables.roles
        );
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(role_from_row).collect())
    }

    async fn delete_role(&self, id: RoleId) -> Result<bool, StorageError> {
        let t = &self.tables;
        let mut tx = self.pool.begin().await?;

        for link in [&t.role_has_permissions, &t.model_has_roles] {
            let sql = format!("DELETE FROM {link} WHERE role_id = ?");
            sqlx::query(&sql).bind(id.0).execute(&mut *tx).await?;
        }

        let sql = format!("DELETE FROM {} WHERE id = ?", t.roles);
        let result = sqlx::query(&sql).bind(id.0).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn attach_role_permission(
        &self,
        role: RoleId,
        permission: PermissionId,
    ) -> Result<bool, StorageError> {
        let t = &self.tables;
        let mut tx = self.pool.begin().await?;
        Self::exists(&mut tx, &t.roles, EntityKind::Role, role.0).await?;
        Self::exists(&mut tx, &t.permissions, EntityKind::Permission, permission.0).await?;

        let sql = format!(
            "INSERT OR IGNORE INTO {} (role_id, permission_id) VALUES (?, ?)",
            t.role_has_permissions
        );
        let result = sqlx::query(&sql)
            .bind(role.0)
            .bind(permission.0)
            .execute(&mut *tx)
            .await?;
        let created = result.rows_affected() > 0;
        if created {
            Self::touch_role(&mut tx, &t.roles, role).await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn detach_role_permission(
        &self,
        role: RoleId,
        permission: PermissionId,
    ) -> Result<bool, StorageError> {
        let t = &self.tables;
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "DELETE FROM {} WHERE role_id = ? AND permission_id = ?",
            t.role_has_permissions
        );
        let result = sqlx::query(&sql)
            .bind(role.0)
            .bind(permission.0)
            .execute(&mut *tx)
            .await?;
        let removed = result.rows_affected() > 0;
        if removed {
            Self::touch_role(&mut tx, &t.roles, role).await?;
        }

        tx.commit().await?;
        Ok(removed)
    }

    async fn attach_user_role(&self, user: &UserRef, role: RoleId) -> Result<bool, StorageError> {
        let t = &self.tables;
        let mut tx = self.pool.begin().await?;
        Self::exists(&mut tx, &t.roles, EntityKind::Role, role.0).await?;

        let sql = format!(
            "INSERT OR IGNORE INTO {} (model_type, model_id, role_id) VALUES (?, ?, ?)",
            t.model_has_roles
        );
        let result = sqlx::query(&sql)
            .bind(&user.model_type)
            .bind(user.id)
            .bind(role.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn detach_user_role(&self, user: &UserRef, role: RoleId) -> Result<bool, StorageError> {
        let sql = format!(
            "DELETE FROM {} WHERE model_type = ? AND model_id = ? AND role_id = ?",
            self.tables.model_has_roles
        );
        let result = sqlx::query(&sql)
            .bind(&user.model_type)
            .bind(user.id)
            .bind(role.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn user_role_ids(&self, user: &UserRef) -> Result<Vec<RoleId>, StorageError> {
        let sql = format!(
            "SELECT role_id FROM {} WHERE model_type = ? AND model_id = ? ORDER BY role_id",
            self.tables.model_has_roles
        );
        let rows = sqlx::query_scalar::<_, i64>(&sql)
            .bind(&user.model_type)
            .bind(user.id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(RoleId).collect())
    }

    async fn role_users(&self, role: RoleId) -> Result<Vec<UserRef>, StorageError> {
        self.user_links(&self.tables.model_has_roles, "role_id", role.0)
            .await
    }

    async fn attach_user_permission(
        &self,
        user: &UserRef,
        permission: PermissionId,
    ) -> Result<bool, StorageError> {
        let t = &self.tables;
        let mut tx = self.pool.begin().await?;
        Self::exists(&mut tx, &t.permissions, EntityKind::Permission, permission.0).await?;

        let sql = format!(
            "INSERT OR IGNORE INTO {} (model_type, model_id, permission_id) VALUES (?, ?, ?)",
            t.model_has_permissions
        );
        let result = sqlx::query(&sql)
            .bind(&user.model_type)
            .bind(user.id)
            .bind(permission.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn detach_user_permission(
        &self,
        user: &UserRef,
        permission: PermissionId,
    ) -> Result<bool, StorageError> {
        let sql = format!(
            "DELETE FROM {} WHERE model_type = ? AND model_id = ? AND permission_id = ?",
            self.tables.model_has_permissions
        );
        let result = sqlx::query(&sql)
            .bind(&user.model_type)
            .bind(user.id)
            .bind(permission.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn user_permission_ids(&self, user: &UserRef) -> Result<Vec<PermissionId>, StorageError> {
        let sql = format!(
            "SELECT permission_id FROM {} WHERE model_type = ? AND model_id = ? ORDER BY permission_id",
            self.tables.model_has_permissions
        );
        let rows = sqlx::query_scalar::<_, i64>(&sql)
            .bind(&user.model_type)
            .bind(user.id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PermissionId).collect())
    }

    async fn permission_users(
        &self,
        permission: PermissionId,
    ) -> Result<Vec<UserRef>, StorageError> {
        self.user_links(&self.tables.model_has_permissions, "permission_id", permission.0)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unique_constraint_is_enforced() {
        let db = SqliteBackend::connect(":memory:").await.unwrap();
        let first = db.insert_permission("edit-articles", "web").await.unwrap();
        let err = db
            .insert_permission("edit-articles", "web")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::UniqueViolation {
                kind: EntityKind::Permission,
                ..
            }
        ));

        let other_guard = db.insert_permission("edit-articles", "api").await.unwrap();
        assert_ne!(first.id, other_guard.id);

        let found = db.find_permission("edit-articles", "web").await.unwrap();
        assert_eq!(found, Some(first));
    }

    #[tokio::test]
    async fn test_memory_databases_are_isolated() {
        let a = SqliteBackend::connect(":memory:").await.unwrap();
        let b = SqliteBackend::connect(":memory:").await.unwrap();
        a.insert_role("admin", "web").await.unwrap();
        assert!(b.find_role("admin", "web").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_links_and_cascade() {
        let db = SqliteBackend::connect(":memory:").await.unwrap();
        let user = UserRef::new("user", 7);
        let edit = db.insert_permission("edit", "web").await.unwrap();
        let publish = db.insert_permission("publish", "web").await.unwrap();
        let writer = db.insert_role("writer", "web").await.unwrap();

        assert!(db.attach_role_permission(writer.id, edit.id).await.unwrap());
        assert!(!db.attach_role_permission(writer.id, edit.id).await.unwrap());
        assert!(db.attach_role_permission(writer.id, publish.id).await.unwrap());
        assert!(db.attach_user_role(&user, writer.id).await.unwrap());
        assert!(db.attach_user_permission(&user, edit.id).await.unwrap());

        let loaded = db.load_permissions().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].role_ids, vec![writer.id]);

        assert_eq!(db.role_users(writer.id).await.unwrap(), vec![user.clone()]);
        assert_eq!(db.permission_users(edit.id).await.unwrap(), vec![user.clone()]);

        assert!(db.delete_permission(edit.id).await.unwrap());
        assert!(db.user_permission_ids(&user).await.unwrap().is_empty());
        let loaded = db.load_permissions().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].permission.id, publish.id);

        assert!(db.delete_role(writer.id).await.unwrap());
        assert!(db.user_role_ids(&user).await.unwrap().is_empty());
        assert!(db.load_permissions().await.unwrap()[0].role_ids.is_empty());
        assert!(!db.delete_role(writer.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_attach_to_missing_record() {
        let db = SqliteBackend::connect(":memory:").await.unwrap();
        let writer = db.insert_role("writer", "web").await.unwrap();
        let err = db
            .attach_role_permission(writer.id, PermissionId(404))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::MissingRecord {
                kind: EntityKind::Permission,
                id: 404
            }
        ));
        let err = db
            .attach_user_role(&UserRef::new("user", 1), RoleId(404))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::MissingRecord { kind: EntityKind::Role, .. }));
    }

    #[tokio::test]
    async fn test_custom_collection_names() {
        let tables = CollectionNames {
            permissions: "acl_permissions".into(),
            roles: "acl_roles".into(),
            ..CollectionNames::default()
        };
        let db = SqliteBackend::connect_with(":memory:", tables).await.unwrap();
        db.insert_permission("edit", "web").await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM acl_permissions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("acl.db");
        let path = path.to_str().unwrap();

        {
            let db = SqliteBackend::connect(path).await.unwrap();
            db.insert_role("admin", "web").await.unwrap();
            db.pool().close().await;
        }

        let db = SqliteBackend::connect(path).await.unwrap();
        let role = db.find_role("admin", "web").await.unwrap();
        assert!(role.is_some());
    }
}
