//! Process-wide permission cache.
//!
//! The registrar holds every permission together with the ids of the roles
//! holding it, so authorization checks never hit storage for the permission
//! side of a lookup.
//!
//! # Lifecycle
//!
//! - Starts empty; the first [`PermissionRegistrar::permissions`] call loads from storage
//! - Every mutating store operation calls [`PermissionRegistrar::forget_cached_permissions`]
//!   after its write has completed
//! - Invalidation drops the whole set; the next read reloads it
//!
//! At most one reload runs at a time. Callers arriving during a reload wait
//! for it and reuse its result. A reload that overlaps an invalidation is
//! handed to its own caller but never installed.

use crate::metrics;
use crate::model::{Permission, PermissionId, PermissionRef, RoleId};
use crate::storage::{PermissionBackend, PermissionRecord, StorageError};
use crate::telemetry::spans;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{Instrument, debug};

/// An immutable snapshot of every permission and its role links.
#[derive(Debug)]
pub struct PermissionSet {
    records: Vec<PermissionRecord>,
    /// guard -> name -> index into `records`.
    by_guard: HashMap<String, HashMap<String, usize>>,
    by_id: HashMap<PermissionId, usize>,
    loaded_at: Instant,
}

impl PermissionSet {
    pub fn new(records: Vec<PermissionRecord>) -> Self {
        let mut by_guard: HashMap<String, HashMap<String, usize>> = HashMap::new();
        let mut by_id = HashMap::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            let p = &record.permission;
            by_guard
                .entry(p.guard_name.clone())
                .or_default()
                .insert(p.name.clone(), idx);
            by_id.insert(p.id, idx);
        }
        Self {
            records,
            by_guard,
            by_id,
            loaded_at: Instant::now(),
        }
    }

    /// Look up a permission by (name, guard).
    pub fn find(&self, name: &str, guard: &str) -> Option<&Permission> {
        let idx = *self.by_guard.get(guard)?.get(name)?;
        Some(&self.records[idx].permission)
    }

    pub fn get(&self, id: PermissionId) -> Option<&Permission> {
        self.by_id.get(&id).map(|&idx| &self.records[idx].permission)
    }

    /// Resolve a permission reference, names looked up under `guard`.
    pub fn resolve(&self, permission: PermissionRef<'_>, guard: &str) -> Option<&Permission> {
        match permission {
            PermissionRef::Name(name) => self.find(name, guard),
            PermissionRef::Id(id) => self.get(id),
            PermissionRef::Record(p) => self.get(p.id),
        }
    }

    /// Ids of the roles holding a permission; empty for unknown ids.
    pub fn role_ids(&self, id: PermissionId) -> &[RoleId] {
        self.by_id
            .get(&id)
            .map(|&idx| self.records[idx].role_ids.as_slice())
            .unwrap_or(&[])
    }

    /// True when the role holds the permission.
    pub fn role_has(&self, role: RoleId, permission: PermissionId) -> bool {
        self.role_ids(permission).contains(&role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> + '_ {
        self.records.iter().map(|r| &r.permission)
    }

    pub fn for_guard<'a>(&'a self, guard: &'a str) -> impl Iterator<Item = &'a Permission> + 'a {
        self.iter().filter(move |p| p.guard_name == guard)
    }

    /// Permissions held by a role.
    pub fn for_role(&self, role: RoleId) -> impl Iterator<Item = &Permission> + '_ {
        self.records
            .iter()
            .filter(move |r| r.role_ids.contains(&role))
            .map(|r| &r.permission)
    }

    /// Permissions held by any of the given roles.
    pub fn for_roles<'a>(&'a self, roles: &'a [RoleId]) -> impl Iterator<Item = &'a Permission> + 'a {
        self.records
            .iter()
            .filter(move |r| r.role_ids.iter().any(|id| roles.contains(id)))
            .map(|r| &r.permission)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Age of this snapshot.
    pub fn age(&self) -> Duration {
        self.loaded_at.elapsed()
    }
}

/// Read-through cache over the permission collection.
pub struct PermissionRegistrar {
    backend: Arc<dyn PermissionBackend>,
    ttl: Option<Duration>,
    current: RwLock<Option<Arc<PermissionSet>>>,
    /// Bumped by every invalidation; a reload only installs its result if
    /// the generation did not move while it was loading.
    generation: AtomicU64,
    reload: tokio::sync::Mutex<()>,
}

impl PermissionRegistrar {
    pub fn new(backend: Arc<dyn PermissionBackend>) -> Self {
        Self {
            backend,
            ttl: None,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            reload: tokio::sync::Mutex::new(()),
        }
    }

    /// Expire loaded sets after `ttl` even without an invalidation.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// The storage backend this registrar reads from.
    pub fn backend(&self) -> &Arc<dyn PermissionBackend> {
        &self.backend
    }

    /// The current permission set, loading it from storage if needed.
    pub async fn permissions(&self) -> Result<Arc<PermissionSet>, StorageError> {
        if let Some(set) = self.cached() {
            metrics::record_cache_hit();
            return Ok(set);
        }
        metrics::record_cache_miss();

        let _reload = self.reload.lock().await;

        // Someone else finished a reload while we were waiting.
        if let Some(set) = self.cached() {
            return Ok(set);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let started = Instant::now();
        let records = self
            .backend
            .load_permissions()
            .instrument(spans::reload())
            .await?;
        let set = Arc::new(PermissionSet::new(records));
        metrics::record_reload(started.elapsed().as_secs_f64());

        {
            let mut slot = self.current.write();
            if self.generation.load(Ordering::Acquire) == generation {
                *slot = Some(Arc::clone(&set));
                debug!(count = set.len(), "Permission cache loaded");
            } else {
                debug!(
                    count = set.len(),
                    "Permission cache invalidated during reload, not installing"
                );
            }
        }

        Ok(set)
    }

    /// Drop the cached set; the next read reloads from storage.
    pub fn forget_cached_permissions(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.current.write() = None;
        metrics::record_invalidation();
        debug!("Permission cache invalidated");
    }

    /// True while a valid set is cached.
    pub fn is_warm(&self) -> bool {
        self.cached().is_some()
    }

    fn cached(&self) -> Option<Arc<PermissionSet>> {
        let slot = self.current.read();
        let set = slot.as_ref()?;
        if let Some(ttl) = self.ttl
            && set.age() >= ttl
        {
            return None;
        }
        Some(Arc::clone(set))
    }
}

impl std::fmt::Debug for PermissionRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionRegistrar")
            .field("ttl", &self.ttl)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("warm", &self.is_warm())
            .finish()
    }
}
