//! Snapshot lifecycle and service quiescence.
//!
//! Snapshots are point-in-time copies of every cache in the service. The
//! copy is cut while holding the service quiescence lock exclusively, so no
//! mutation can land halfway through; file IO happens afterwards on a
//! blocking thread. Every lifecycle operation runs under a bounded deadline;
//! on expiry the caller gets `GridError::Timeout` and must reconcile by
//! re-listing snapshots, because the background work may still complete.

use crate::cache::context::CacheContext;
use crate::cluster::coordinator::PartitionCoordinator;
use crate::cluster::types::{GridNotification, NotificationSink};
use crate::config::GridConfig;
use crate::error::{GridError, GridResult};
use crate::persistence::snapshot::{self, SnapshotMeta, SnapshotRecord};
use crate::storage::entry::VersionedEntry;
use crate::types::{GridKey, GridValue};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock};

pub struct PersistenceCoordinator<K, V> {
    service: String,
    config: GridConfig,
    coordinator: Arc<PartitionCoordinator<K, V>>,
    caches: Arc<DashMap<String, Arc<CacheContext<K, V>>>>,
    quiesce: Arc<RwLock<()>>,
    // Holds the quiescence write guard while the service is suspended.
    suspended: Mutex<Option<OwnedRwLockWriteGuard<()>>>,
    sink: Arc<dyn NotificationSink>,
}

impl<K: GridKey, V: GridValue> PersistenceCoordinator<K, V> {
    pub(crate) fn new(
        service: String,
        config: GridConfig,
        coordinator: Arc<PartitionCoordinator<K, V>>,
        caches: Arc<DashMap<String, Arc<CacheContext<K, V>>>>,
        quiesce: Arc<RwLock<()>>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            service,
            config,
            coordinator,
            caches,
            quiesce,
            suspended: Mutex::new(None),
            sink,
        }
    }

    async fn deadline<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = GridResult<T>>,
    ) -> GridResult<T> {
        match tokio::time::timeout(self.config.snapshot_deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(GridError::Timeout {
                operation: operation.to_string(),
                waited_ms: self.config.snapshot_deadline.as_millis() as u64,
            }),
        }
    }

    /// Creates a named snapshot of every cache in the service. Fails if a
    /// complete snapshot with this name already exists.
    pub async fn create_snapshot(&self, name: &str) -> GridResult<SnapshotMeta> {
        self.deadline("create snapshot", self.create_inner(name)).await
    }

    async fn create_inner(&self, name: &str) -> GridResult<SnapshotMeta> {
        let dir = snapshot::snapshot_dir(&self.config.snapshot_root, &self.service, name);
        if snapshot::read_meta(&dir).is_some() {
            return Err(GridError::SnapshotExists(name.to_string()));
        }
        self.sink.publish(GridNotification::SnapshotBegin {
            name: name.to_string(),
        });

        // If the service is already suspended we hold the quiescence guard
        // through `suspended`; otherwise take it here for the cut. Either way
        // the suspended slot stays locked so resume cannot race the copy.
        let slot = self.suspended.lock().await;
        let _cut = if slot.is_some() {
            None
        } else {
            Some(self.quiesce.write().await)
        };

        let mut entry_count = 0u64;
        let mut per_cache: Vec<(String, Vec<SnapshotRecord<K, V>>)> = Vec::new();
        let mut cache_names: Vec<String> =
            self.caches.iter().map(|e| e.key().clone()).collect();
        cache_names.sort();
        for cache in &cache_names {
            let records: Vec<SnapshotRecord<K, V>> = self
                .coordinator
                .cache_entries_versioned(cache)
                .into_iter()
                .map(|(partition, key, entry)| SnapshotRecord {
                    partition,
                    key,
                    value: entry.value,
                    version: entry.version,
                })
                .collect();
            entry_count += records.len() as u64;
            per_cache.push((cache.clone(), records));
        }
        drop(_cut);
        drop(slot);

        let meta = SnapshotMeta {
            name: name.to_string(),
            service: self.service.clone(),
            created_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            caches: cache_names,
            entry_count,
        };

        let meta_clone = meta.clone();
        tokio::task::spawn_blocking(move || -> GridResult<()> {
            std::fs::create_dir_all(&dir)?;
            for (cache, records) in &per_cache {
                snapshot::write_records(&dir, cache, records)?;
            }
            snapshot::write_meta(&dir, &meta_clone)
        })
        .await
        .map_err(|e| GridError::SnapshotFailed {
            reason: e.to_string(),
        })??;

        self.sink.publish(GridNotification::SnapshotEnd {
            name: name.to_string(),
        });
        tracing::info!(snapshot = name, entries = meta.entry_count, "snapshot created");
        Ok(meta)
    }

    /// Replaces the live contents of every cache recorded in the snapshot
    /// with the snapshot's contents. Entries land in the partition they were
    /// stored from, on whichever node currently owns it; versions are
    /// restored verbatim. Bulk replacement: no per-entry events fire, and
    /// indexes are rebuilt afterwards.
    pub async fn recover_snapshot(&self, name: &str) -> GridResult<SnapshotMeta> {
        self.deadline("recover snapshot", self.recover_inner(name)).await
    }

    async fn recover_inner(&self, name: &str) -> GridResult<SnapshotMeta> {
        let dir = snapshot::snapshot_dir(&self.config.snapshot_root, &self.service, name);
        let Some(meta) = snapshot::read_meta(&dir) else {
            return Err(GridError::SnapshotNotFound(name.to_string()));
        };
        self.sink.publish(GridNotification::RecoveryBegin {
            name: name.to_string(),
        });

        let caches = meta.caches.clone();
        let read_dir = dir.clone();
        let loaded: Vec<(String, Vec<SnapshotRecord<K, V>>)> =
            tokio::task::spawn_blocking(move || -> GridResult<_> {
                let mut loaded = Vec::with_capacity(caches.len());
                for cache in &caches {
                    loaded.push((cache.clone(), snapshot::read_records(&read_dir, cache)?));
                }
                Ok(loaded)
            })
            .await
            .map_err(|e| GridError::SnapshotFailed {
                reason: e.to_string(),
            })??;

        let slot = self.suspended.lock().await;
        let _cut = if slot.is_some() {
            None
        } else {
            Some(self.quiesce.write().await)
        };

        let assignment = self.coordinator.partition_assignment();
        for (cache, records) in loaded {
            self.coordinator.for_each_node(|node| node.truncate_cache(&cache));
            if let Some(ctx) = self.caches.get(&cache) {
                ctx.indexes.clear();
            }
            for record in records {
                let Some(owner) = assignment.get(record.partition as usize) else {
                    tracing::warn!(
                        cache = %cache,
                        partition = record.partition,
                        "record partition outside current partition count; skipped"
                    );
                    continue;
                };
                if let Some(node) = self.coordinator.node(owner) {
                    node.install_entry(
                        &cache,
                        record.partition,
                        record.key,
                        VersionedEntry {
                            value: record.value,
                            version: record.version,
                        },
                    );
                }
            }
            if let Some(ctx) = self.caches.get(&cache) {
                let entries = self.coordinator.cache_entries(&cache);
                ctx.indexes.rebuild(&entries);
            }
        }
        drop(_cut);
        drop(slot);

        self.sink.publish(GridNotification::RecoveryEnd {
            name: name.to_string(),
        });
        tracing::info!(snapshot = name, entries = meta.entry_count, "snapshot recovered");
        Ok(meta)
    }

    /// Deletes a snapshot from disk, including the partial directory an
    /// interrupted create leaves behind. Live cache contents are unaffected.
    pub async fn remove_snapshot(&self, name: &str) -> GridResult<()> {
        let root = self.config.snapshot_root.clone();
        let service = self.service.clone();
        let owned = name.to_string();
        self.deadline("remove snapshot", async move {
            tokio::task::spawn_blocking(move || snapshot::remove_dir(&root, &service, &owned))
                .await
                .map_err(|e| GridError::SnapshotFailed {
                    reason: e.to_string(),
                })?
        })
        .await?;
        tracing::info!(snapshot = name, "snapshot removed");
        Ok(())
    }

    /// Names and descriptors of every complete snapshot of this service.
    pub async fn list_snapshots(&self) -> GridResult<Vec<SnapshotMeta>> {
        let root = self.config.snapshot_root.clone();
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || snapshot::list_valid(&root, &service))
            .await
            .map_err(|e| GridError::SnapshotFailed {
                reason: e.to_string(),
            })?
    }

    /// Blocks all cache mutations until `resume_service`. Waits for in-flight
    /// mutations to drain first. Idempotent.
    pub async fn suspend_service(&self) {
        let mut slot = self.suspended.lock().await;
        if slot.is_none() {
            *slot = Some(self.quiesce.clone().write_owned().await);
            tracing::info!(service = %self.service, "service suspended");
        }
    }

    /// Lifts a suspension. A no-op if the service is not suspended.
    pub async fn resume_service(&self) {
        let mut slot = self.suspended.lock().await;
        if slot.take().is_some() {
            tracing::info!(service = %self.service, "service resumed");
        }
    }

    pub async fn is_suspended(&self) -> bool {
        self.suspended.lock().await.is_some()
    }
}
