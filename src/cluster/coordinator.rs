//! Partition ownership and rebalancing.
//!
//! The coordinator maps every key to one of a fixed number of partitions and
//! every partition to exactly one owning storage node. Membership changes
//! recompute the desired assignment and move partitions one at a time; each
//! move publishes a Begin/End transfer notification pair and flips ownership
//! atomically under the partition's store locks.

use crate::cluster::types::{
    GridNotification, NodeId, NotificationSink, PartitionState, TransferEvent, TransferPhase,
};
use crate::error::{GridError, GridResult};
use crate::storage::node::StorageNode;
use crate::types::{GridKey, GridValue};
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::Hasher;
use std::sync::Arc;

pub struct PartitionCoordinator<K, V> {
    partition_count: u32,
    nodes: RwLock<BTreeMap<NodeId, Arc<StorageNode<K, V>>>>,
    states: RwLock<Vec<PartitionState>>,
    // Serializes membership changes and the transfers they trigger.
    rebalance: Mutex<()>,
    sink: Arc<dyn NotificationSink>,
}

impl<K: GridKey, V: GridValue> PartitionCoordinator<K, V> {
    /// Creates the coordinator with a single seed node owning every partition.
    pub fn bootstrap(
        partition_count: u32,
        seed: Arc<StorageNode<K, V>>,
        sink: Arc<dyn NotificationSink>,
    ) -> Arc<Self> {
        let states = (0..partition_count)
            .map(|p| {
                seed.assign_partition(p);
                PartitionState::Owned(seed.id().clone())
            })
            .collect();
        let mut nodes = BTreeMap::new();
        nodes.insert(seed.id().clone(), seed);
        Arc::new(Self {
            partition_count,
            nodes: RwLock::new(nodes),
            states: RwLock::new(states),
            rebalance: Mutex::new(()),
            sink,
        })
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Key-to-partition routing. Deterministic for the lifetime of the
    /// service: same key, same partition, regardless of membership.
    pub fn route(&self, key: &K) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partition_count as u64) as u32
    }

    /// The node currently serving a partition. During a transfer this is the
    /// source node until the flip.
    pub fn owner_of(&self, partition: u32) -> Arc<StorageNode<K, V>> {
        let owner_id = {
            let states = self.states.read();
            states[partition as usize].serving_node().clone()
        };
        // State lock released before touching the node map; transfers take
        // partition store locks before the state write lock.
        self.nodes
            .read()
            .get(&owner_id)
            .cloned()
            .unwrap_or_else(|| self.any_node())
    }

    fn any_node(&self) -> Arc<StorageNode<K, V>> {
        let nodes = self.nodes.read();
        let (_, node) = nodes
            .iter()
            .next()
            .unwrap_or_else(|| unreachable!("coordinator never holds zero nodes"));
        node.clone()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.read().keys().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Current partition-to-node assignment, indexed by partition.
    pub fn partition_assignment(&self) -> Vec<NodeId> {
        self.states
            .read()
            .iter()
            .map(|state| state.serving_node().clone())
            .collect()
    }

    /// Adds a node and rebalances partitions onto it.
    pub fn join(&self, node: Arc<StorageNode<K, V>>) -> GridResult<()> {
        let _guard = self.rebalance.lock();
        let id = node.id().clone();
        self.nodes.write().insert(id.clone(), node);
        tracing::info!(node = %id, "storage node joined");
        self.rebalance_locked();
        Ok(())
    }

    /// Removes a node, first transferring every partition it owns to the
    /// survivors. Removing the last node is rejected: the data would have
    /// nowhere to go.
    pub fn leave(&self, id: &NodeId) -> GridResult<()> {
        let _guard = self.rebalance.lock();
        {
            let nodes = self.nodes.read();
            if !nodes.contains_key(id) {
                return Err(GridError::Topology(format!("unknown node {id}")));
            }
            if nodes.len() == 1 {
                return Err(GridError::Topology(
                    "cannot remove the last storage node".to_string(),
                ));
            }
        }

        let survivors: Vec<NodeId> = self
            .nodes
            .read()
            .keys()
            .filter(|n| *n != id)
            .cloned()
            .collect();
        for partition in 0..self.partition_count {
            let current = self.states.read()[partition as usize].serving_node().clone();
            if &current == id {
                let dest = survivors[partition as usize % survivors.len()].clone();
                self.transfer(partition, id.clone(), dest);
            }
        }
        self.nodes.write().remove(id);
        tracing::info!(node = %id, "storage node left");
        self.rebalance_locked();
        Ok(())
    }

    /// Moves partitions until the live assignment matches the desired one.
    /// Desired owner of partition p is `sorted_node_ids[p % n]`, which keeps
    /// assignments near-uniform and stable under membership changes.
    fn rebalance_locked(&self) {
        let ids: Vec<NodeId> = self.nodes.read().keys().cloned().collect();
        for partition in 0..self.partition_count {
            let desired = ids[partition as usize % ids.len()].clone();
            let current = self.states.read()[partition as usize].serving_node().clone();
            if current != desired {
                self.transfer(partition, current, desired);
            }
        }
        tracing::debug!(nodes = ids.len(), "rebalance complete");
    }

    /// One partition move: Begin notification, state to Transferring, data
    /// copy with ownership flip under the store locks, End notification.
    fn transfer(&self, partition: u32, from: NodeId, to: NodeId) {
        let (source, dest) = {
            let nodes = self.nodes.read();
            let Some(source) = nodes.get(&from).cloned() else {
                return;
            };
            let Some(dest) = nodes.get(&to).cloned() else {
                return;
            };
            (source, dest)
        };

        self.sink.publish(GridNotification::Transfer(TransferEvent {
            partition,
            phase: TransferPhase::Begin,
            from: from.clone(),
            to: to.clone(),
        }));

        self.states.write()[partition as usize] = PartitionState::Transferring {
            from: from.clone(),
            to: to.clone(),
        };

        let states = &self.states;
        let to_flip = to.clone();
        source.transfer_partition(partition, &dest, move || {
            states.write()[partition as usize] = PartitionState::Owned(to_flip);
        });

        self.sink.publish(GridNotification::Transfer(TransferEvent {
            partition,
            phase: TransferPhase::End,
            from,
            to,
        }));
    }

    /// Snapshot of one cache's entries across all nodes, keyed by the
    /// partition each entry lives in.
    pub(crate) fn cache_entries_versioned(
        &self,
        cache: &str,
    ) -> Vec<(u32, K, crate::storage::entry::VersionedEntry<V>)> {
        let assignment = self.partition_assignment();
        let nodes = self.nodes.read();
        let mut out = Vec::new();
        for (partition, owner) in assignment.iter().enumerate() {
            let Some(node) = nodes.get(owner) else {
                continue;
            };
            for (key, entry) in node.read_partition(cache, partition as u32) {
                out.push((partition as u32, key, entry));
            }
        }
        out
    }

    /// Plain key/value view of one cache's entries across all nodes.
    pub(crate) fn cache_entries(&self, cache: &str) -> std::collections::HashMap<K, V> {
        self.cache_entries_versioned(cache)
            .into_iter()
            .map(|(_, key, entry)| (key, entry.value))
            .collect()
    }

    /// Runs `f` once per node against its currently-owned partitions.
    pub(crate) fn for_each_node(&self, mut f: impl FnMut(&Arc<StorageNode<K, V>>)) {
        for node in self.nodes.read().values() {
            f(node);
        }
    }

    pub(crate) fn node(&self, id: &NodeId) -> Option<Arc<StorageNode<K, V>>> {
        self.nodes.read().get(id).cloned()
    }
}
