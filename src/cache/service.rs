//! The cache service: the unit of co-located caches and storage nodes.
//!
//! One service owns a fixed partition space, a set of storage nodes, and any
//! number of named caches sharing the service's key/value types. Snapshots
//! span every cache of the service, which is why caches that must be captured
//! together belong in one service.

use crate::cache::context::{CacheContext, CacheOptions};
use crate::cache::facade::NamedCache;
use crate::cluster::coordinator::PartitionCoordinator;
use crate::cluster::types::{LogSink, NodeId, NotificationSink};
use crate::config::GridConfig;
use crate::error::GridResult;
use crate::persistence::coordinator::PersistenceCoordinator;
use crate::security::Principal;
use crate::storage::node::StorageNode;
use crate::types::{GridKey, GridValue};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct CacheService<K, V> {
    name: String,
    config: GridConfig,
    coordinator: Arc<PartitionCoordinator<K, V>>,
    caches: Arc<DashMap<String, Arc<CacheContext<K, V>>>>,
    // Quiescence gate: mutations hold it shared, snapshot cuts and
    // suspension hold it exclusively.
    quiesce: Arc<RwLock<()>>,
    persistence: PersistenceCoordinator<K, V>,
}

impl<K: GridKey, V: GridValue> CacheService<K, V> {
    /// Starts a service with one seed storage node owning every partition.
    pub fn new(name: impl Into<String>, config: GridConfig) -> Arc<Self> {
        Self::with_sink(name, config, Arc::new(LogSink))
    }

    pub fn with_sink(
        name: impl Into<String>,
        config: GridConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Arc<Self> {
        let name = name.into();
        let seed = StorageNode::new();
        let coordinator =
            PartitionCoordinator::bootstrap(config.partition_count, seed, sink.clone());
        let caches: Arc<DashMap<String, Arc<CacheContext<K, V>>>> = Arc::new(DashMap::new());
        let quiesce = Arc::new(RwLock::new(()));
        let persistence = PersistenceCoordinator::new(
            name.clone(),
            config.clone(),
            coordinator.clone(),
            caches.clone(),
            quiesce.clone(),
            sink,
        );
        tracing::info!(service = %name, partitions = config.partition_count, "cache service started");
        Arc::new(Self {
            name,
            config,
            coordinator,
            caches,
            quiesce,
            persistence,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// A façade over the named cache, created with default options on first
    /// use. The principal travels with the handle and is presented to the
    /// cache's authorizer on every operation.
    pub fn cache(self: &Arc<Self>, name: &str, principal: Principal) -> NamedCache<K, V> {
        self.cache_with_options(name, CacheOptions::default(), principal)
    }

    /// Like `cache`, registering the store/authorizer hooks if this is the
    /// first use of the name. Options are fixed at registration: later calls
    /// for the same name reuse the existing wiring.
    pub fn cache_with_options(
        self: &Arc<Self>,
        name: &str,
        options: CacheOptions<K, V>,
        principal: Principal,
    ) -> NamedCache<K, V> {
        let context = self
            .caches
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(service = %self.name, cache = name, "cache registered");
                Arc::new(CacheContext::new(name, options))
            })
            .clone();
        NamedCache::new(
            context,
            self.coordinator.clone(),
            self.quiesce.clone(),
            self.config.clone(),
            principal,
        )
    }

    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Adds a storage node and rebalances partitions onto it. Held off while
    /// a snapshot cut or suspension is in progress.
    pub async fn join_node(&self) -> GridResult<NodeId> {
        let _gate = self.quiesce.read().await;
        let node = StorageNode::new();
        let id = node.id().clone();
        self.coordinator.join(node)?;
        Ok(id)
    }

    /// Removes a storage node after transferring its partitions away.
    /// Removing the last node is an error.
    pub async fn leave_node(&self, id: &NodeId) -> GridResult<()> {
        let _gate = self.quiesce.read().await;
        self.coordinator.leave(id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.coordinator.node_ids()
    }

    pub fn partition_assignment(&self) -> Vec<NodeId> {
        self.coordinator.partition_assignment()
    }

    /// Snapshot lifecycle and suspend/resume operations for this service.
    pub fn persistence(&self) -> &PersistenceCoordinator<K, V> {
        &self.persistence
    }
}
