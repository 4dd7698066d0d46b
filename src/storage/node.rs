//! Storage node: backing maps and the per-entry commit pipeline.
//!
//! A node holds the in-memory backing map for every partition it owns, one
//! map per cache per partition, each behind its own mutex. All reads and
//! mutations for a partition serialize on that mutex, which is what makes a
//! read-modify-write-notify sequence atomic per entry: the ownership check,
//! authorizer, pre-commit events, cache-store hook, backing-map commit,
//! index maintenance, and post-commit events all happen inside one critical
//! section.
//!
//! Ownership is checked *inside* the critical section. A partition transfer
//! revokes source ownership first and only then enumerates and locks the
//! backing maps, so a writer that raced a transfer either committed before
//! the revocation (and its write travels with the copy) or observes
//! `WrongNode` and is re-routed by the façade. This covers first-touch
//! writes too: a map materialized after the revocation can never accept a
//! commit, so the enumeration cannot miss live data. There is no window in
//! which two nodes accept writes for one partition.

use crate::cache::context::CacheContext;
use crate::cluster::types::NodeId;
use crate::error::{GridError, GridResult};
use crate::events::types::{EventKind, MapEvent};
use crate::processor::types::{Pending, ProcessorEntry};
use crate::security::{AccessReason, Principal};
use crate::storage::entry::VersionedEntry;
use crate::types::{GridKey, GridValue};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type PartitionRef<K, V> = Arc<Mutex<HashMap<K, VersionedEntry<V>>>>;

pub struct StorageNode<K, V> {
    id: NodeId,
    owned: RwLock<HashSet<u32>>,
    caches: DashMap<String, DashMap<u32, PartitionRef<K, V>>>,
}

impl<K: GridKey, V: GridValue> StorageNode<K, V> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::new(),
            owned: RwLock::new(HashSet::new()),
            caches: DashMap::new(),
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn owns(&self, partition: u32) -> bool {
        self.owned.read().contains(&partition)
    }

    pub fn owned_partitions(&self) -> Vec<u32> {
        let mut partitions: Vec<u32> = self.owned.read().iter().copied().collect();
        partitions.sort_unstable();
        partitions
    }

    pub(crate) fn assign_partition(&self, partition: u32) {
        self.owned.write().insert(partition);
    }

    /// Backing map handle for one cache partition, created on first use.
    fn partition(&self, cache: &str, partition: u32) -> PartitionRef<K, V> {
        let partitions = self
            .caches
            .entry(cache.to_string())
            .or_insert_with(DashMap::new);
        let handle = partitions
            .entry(partition)
            .or_insert_with(|| Arc::new(Mutex::new(HashMap::new())))
            .clone();
        handle
    }

    /// Handle without creating missing maps; used by scans and snapshots.
    fn existing_partition(&self, cache: &str, partition: u32) -> Option<PartitionRef<K, V>> {
        let partitions = self.caches.get(cache)?;
        partitions.get(&partition).map(|entry| entry.value().clone())
    }

    fn wrong_node(&self, partition: u32) -> GridError {
        GridError::WrongNode {
            partition,
            node: self.id.clone(),
        }
    }

    /// Point read. On a miss with a configured cache store, the value is
    /// loaded from the external system (read-through) and installed with
    /// version 1 and index maintenance, but without listener events: a load
    /// materializes external state rather than mutating it.
    pub fn get(
        &self,
        ctx: &CacheContext<K, V>,
        partition: u32,
        key: &K,
        principal: &Principal,
    ) -> GridResult<Option<V>> {
        let handle = self.partition(&ctx.name, partition);
        let mut entries = handle.lock();
        if !self.owns(partition) {
            return Err(self.wrong_node(partition));
        }

        if let Some(entry) = entries.get(key) {
            let value = entry.value.clone();
            ctx.check_read(key, Some(&value), principal, AccessReason::Get)?;
            return Ok(Some(value));
        }

        let Some(store) = &ctx.store else {
            ctx.check_read(key, None, principal, AccessReason::Get)?;
            return Ok(None);
        };

        let loaded = store.load(key).map_err(|e| GridError::StoreFailure {
            reason: e.to_string(),
        })?;
        match loaded {
            None => {
                ctx.check_read(key, None, principal, AccessReason::Get)?;
                Ok(None)
            }
            Some(value) => {
                ctx.check_read(key, Some(&value), principal, AccessReason::Load)?;
                entries.insert(key.clone(), VersionedEntry::initial(value.clone()));
                ctx.indexes.on_mutation(key, Some(&value));
                tracing::debug!(cache = %ctx.name, partition, "read-through load installed entry");
                Ok(Some(value))
            }
        }
    }

    /// The single mutation pipeline used by put, remove, and entry-processor
    /// invocation. Runs `mutator` against an exclusive view of the entry and
    /// commits whatever it staged:
    ///
    /// ownership check -> authorizer -> mutator -> pre-commit events (veto
    /// aborts) -> cache-store write-through (failure aborts) -> backing-map
    /// commit with version bump -> index maintenance -> post-commit events
    /// (failures logged only).
    pub fn mutate<R>(
        &self,
        ctx: &CacheContext<K, V>,
        partition: u32,
        key: &K,
        principal: &Principal,
        reason: AccessReason,
        mutator: impl FnOnce(&mut ProcessorEntry<K, V>) -> anyhow::Result<R>,
    ) -> GridResult<R> {
        let handle = self.partition(&ctx.name, partition);
        let mut entries = handle.lock();
        if !self.owns(partition) {
            return Err(self.wrong_node(partition));
        }

        let original = entries.get(key).cloned();
        ctx.check_write(
            key,
            original.as_ref().map(|entry| &entry.value),
            principal,
            reason,
        )?;

        let mut view = ProcessorEntry::new(key.clone(), original.as_ref().map(|e| e.value.clone()));
        let output = mutator(&mut view).map_err(|e| GridError::ProcessorFailed {
            reason: e.to_string(),
        })?;
        let (_, pending) = view.into_outcome();

        match pending {
            Pending::Untouched => Ok(output),
            Pending::Set(new_value) => {
                let pre_kind = if original.is_some() {
                    EventKind::Updating
                } else {
                    EventKind::Inserting
                };
                let mut event = MapEvent {
                    cache: ctx.name.clone(),
                    kind: pre_kind,
                    key: key.clone(),
                    old_value: original.as_ref().map(|e| e.value.clone()),
                    new_value: Some(new_value.clone()),
                };
                ctx.events
                    .dispatch_pre_commit(&event)
                    .map_err(|veto| GridError::Vetoed {
                        reason: veto.reason,
                    })?;

                if let Some(store) = &ctx.store {
                    store
                        .store(key, &new_value)
                        .map_err(|e| GridError::StoreFailure {
                            reason: e.to_string(),
                        })?;
                }

                let committed = match &original {
                    Some(previous) => previous.next(new_value.clone()),
                    None => VersionedEntry::initial(new_value.clone()),
                };
                entries.insert(key.clone(), committed);
                ctx.indexes.on_mutation(key, Some(&new_value));

                event.kind = pre_kind.committed();
                ctx.events.dispatch_post_commit(&event);
                Ok(output)
            }
            Pending::Remove => {
                let Some(previous) = original else {
                    // Removing an absent entry is a no-op, not an error.
                    return Ok(output);
                };
                let mut event = MapEvent {
                    cache: ctx.name.clone(),
                    kind: EventKind::Removing,
                    key: key.clone(),
                    old_value: Some(previous.value.clone()),
                    new_value: None,
                };
                ctx.events
                    .dispatch_pre_commit(&event)
                    .map_err(|veto| GridError::Vetoed {
                        reason: veto.reason,
                    })?;

                if let Some(store) = &ctx.store {
                    store.erase(key).map_err(|e| GridError::StoreFailure {
                        reason: e.to_string(),
                    })?;
                }

                entries.remove(key);
                ctx.indexes.on_mutation(key, None);

                event.kind = EventKind::Removed;
                ctx.events.dispatch_post_commit(&event);
                Ok(output)
            }
        }
    }

    /// Current version of an entry, if present. Read under the partition lock.
    pub fn entry_version(&self, cache: &str, partition: u32, key: &K) -> Option<u64> {
        let handle = self.existing_partition(cache, partition)?;
        let entries = handle.lock();
        entries.get(key).map(|entry| entry.version)
    }

    /// Consistent copy of one cache partition's contents.
    pub(crate) fn read_partition(&self, cache: &str, partition: u32) -> Vec<(K, VersionedEntry<V>)> {
        let Some(handle) = self.existing_partition(cache, partition) else {
            return Vec::new();
        };
        let entries = handle.lock();
        entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// Bulk insert used by partition transfer and snapshot recovery. Does
    /// not fire events or touch indexes; callers rebuild indexes themselves.
    pub(crate) fn install_partition(
        &self,
        cache: &str,
        partition: u32,
        entries: Vec<(K, VersionedEntry<V>)>,
    ) {
        let handle = self.partition(cache, partition);
        let mut map = handle.lock();
        for (key, entry) in entries {
            map.insert(key, entry);
        }
    }

    pub(crate) fn install_entry(
        &self,
        cache: &str,
        partition: u32,
        key: K,
        entry: VersionedEntry<V>,
    ) {
        let handle = self.partition(cache, partition);
        handle.lock().insert(key, entry);
    }

    /// Drops every entry of one cache on this node. Bulk truncation: no
    /// per-entry events.
    pub(crate) fn truncate_cache(&self, cache: &str) {
        if let Some(partitions) = self.caches.get(cache) {
            for entry in partitions.iter() {
                entry.value().lock().clear();
            }
        }
    }

    pub(crate) fn cache_entry_count(&self, cache: &str) -> usize {
        match self.caches.get(cache) {
            None => 0,
            Some(partitions) => partitions
                .iter()
                .map(|entry| entry.value().lock().len())
                .sum(),
        }
    }

    /// Moves all data for `partition` to `dest` and flips the coordinator's
    /// routing at a single commit point.
    ///
    /// Source ownership is revoked before the cache maps are enumerated. A
    /// writer whose first touch of a cache materializes a fresh map after
    /// the revocation fails the ownership check and is re-routed, so the
    /// enumeration cannot miss a map holding live data. Every enumerated
    /// map's store lock is then held across the copy and the flip: a write
    /// that committed before the revocation travels with the copy, and one
    /// blocked on a store lock observes `owns() == false` once it frees.
    /// `flip` runs at the commit point, while the locks are still held, so
    /// the coordinator's partition map and the nodes' owned sets change
    /// together.
    pub(crate) fn transfer_partition(
        &self,
        partition: u32,
        dest: &StorageNode<K, V>,
        flip: impl FnOnce(),
    ) {
        self.owned.write().remove(&partition);

        let mut cache_names: Vec<String> =
            self.caches.iter().map(|entry| entry.key().clone()).collect();
        cache_names.sort();

        let handles: Vec<(String, PartitionRef<K, V>)> = cache_names
            .iter()
            .map(|name| (name.clone(), self.partition(name, partition)))
            .collect();
        let guards: Vec<_> = handles.iter().map(|(_, handle)| handle.lock()).collect();

        let mut moved = 0usize;
        for ((name, _), guard) in handles.iter().zip(guards.iter()) {
            let entries: Vec<(K, VersionedEntry<V>)> = guard
                .iter()
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect();
            moved += entries.len();
            dest.install_partition(name, partition, entries);
        }

        dest.owned.write().insert(partition);
        flip();
        drop(guards);

        // Source copies die only after the flip; a writer that was blocked
        // on the partition lock now observes owns() == false.
        for (name, _) in &handles {
            if let Some(partitions) = self.caches.get(name) {
                partitions.remove(&partition);
            }
        }

        tracing::debug!(
            partition,
            entries = moved,
            from = %self.id,
            to = %dest.id,
            "partition contents transferred"
        );
    }
}
