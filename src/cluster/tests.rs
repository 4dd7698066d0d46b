//! Cluster Module Tests
//!
//! Validates routing, partition assignment, and rebalancing safety.
//!
//! ## Test Scopes
//! - **Routing**: Deterministic hashing and fair distribution of keys.
//! - **Assignment**: Every partition owned by exactly one node at all times.
//! - **Rebalancing**: Joins and leaves move data without losing entries, and
//!   publish paired Begin/End transfer notifications.

#[cfg(test)]
mod tests {
    use crate::cache::context::{CacheContext, CacheOptions};
    use crate::cluster::coordinator::PartitionCoordinator;
    use crate::cluster::types::{
        GridNotification, LogSink, NotificationSink, TransferPhase,
    };
    use crate::error::GridError;
    use crate::security::{AccessReason, Principal};
    use crate::storage::node::StorageNode;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    const PARTITIONS: u32 = 31;

    fn coordinator() -> Arc<PartitionCoordinator<String, i64>> {
        PartitionCoordinator::bootstrap(PARTITIONS, StorageNode::new(), Arc::new(LogSink))
    }

    fn put(
        coordinator: &PartitionCoordinator<String, i64>,
        ctx: &CacheContext<String, i64>,
        key: &str,
        value: i64,
    ) {
        let key = key.to_string();
        let partition = coordinator.route(&key);
        let node = coordinator.owner_of(partition);
        node.mutate(
            ctx,
            partition,
            &key,
            &Principal::new("test"),
            AccessReason::Put,
            move |entry| {
                entry.set_value(value);
                Ok(())
            },
        )
        .unwrap();
    }

    fn get(
        coordinator: &PartitionCoordinator<String, i64>,
        ctx: &CacheContext<String, i64>,
        key: &str,
    ) -> Option<i64> {
        let key = key.to_string();
        let partition = coordinator.route(&key);
        let node = coordinator.owner_of(partition);
        node.get(ctx, partition, &key, &Principal::new("test")).unwrap()
    }

    // ============================================================
    // ROUTING TESTS
    // ============================================================

    #[test]
    fn test_route_is_deterministic() {
        let coordinator = coordinator();
        let p1 = coordinator.route(&"order_100".to_string());
        let p2 = coordinator.route(&"order_100".to_string());
        assert_eq!(p1, p2, "the same key should always map to the same partition");
    }

    #[test]
    fn test_route_is_within_range() {
        let coordinator = coordinator();
        for i in 0..1000 {
            let partition = coordinator.route(&format!("key_{i}"));
            assert!(partition < PARTITIONS);
        }
    }

    #[test]
    fn test_route_distribution() {
        let coordinator = coordinator();
        let mut counts: HashMap<u32, usize> = HashMap::new();
        for i in 0..10_000 {
            *counts.entry(coordinator.route(&format!("order_{i}"))).or_insert(0) += 1;
        }
        assert_eq!(
            counts.len() as u32,
            PARTITIONS,
            "10k keys over 31 partitions should touch every partition"
        );
        let max = counts.values().max().copied().unwrap_or(0);
        assert!(max < 1000, "no partition should absorb a disproportionate share, got {max}");
    }

    // ============================================================
    // ASSIGNMENT TESTS
    // ============================================================

    #[test]
    fn test_bootstrap_seed_owns_every_partition() {
        let coordinator = coordinator();
        let assignment = coordinator.partition_assignment();
        assert_eq!(assignment.len() as u32, PARTITIONS);
        let owners: HashSet<_> = assignment.into_iter().collect();
        assert_eq!(owners.len(), 1, "a single node owns all partitions");
    }

    #[test]
    fn test_join_spreads_partitions_exactly_once() {
        let coordinator = coordinator();
        coordinator.join(StorageNode::new()).unwrap();
        coordinator.join(StorageNode::new()).unwrap();

        let ids = coordinator.node_ids();
        assert_eq!(ids.len(), 3);

        // Desired placement: partition p belongs to sorted_nodes[p % n].
        let assignment = coordinator.partition_assignment();
        for (p, owner) in assignment.iter().enumerate() {
            assert_eq!(owner, &ids[p % ids.len()]);
        }

        // Each partition is owned by exactly one node's owned set.
        let mut seen: HashMap<u32, usize> = HashMap::new();
        for id in &ids {
            let node = coordinator.node(id).unwrap();
            for p in node.owned_partitions() {
                *seen.entry(p).or_insert(0) += 1;
            }
        }
        assert_eq!(seen.len() as u32, PARTITIONS);
        assert!(seen.values().all(|count| *count == 1), "no partition may have two owners");
    }

    #[test]
    fn test_leave_of_last_node_is_rejected() {
        let coordinator = coordinator();
        let ids = coordinator.node_ids();
        let outcome = coordinator.leave(&ids[0]);
        assert!(matches!(outcome, Err(GridError::Topology(_))));
    }

    #[test]
    fn test_leave_of_unknown_node_is_rejected() {
        let coordinator = coordinator();
        let outcome = coordinator.leave(&crate::cluster::types::NodeId::new());
        assert!(matches!(outcome, Err(GridError::Topology(_))));
    }

    // ============================================================
    // REBALANCING TESTS
    // ============================================================

    #[test]
    fn test_join_and_leave_preserve_all_entries() {
        let coordinator = coordinator();
        let ctx = CacheContext::new("orders", CacheOptions::default());
        for i in 0..500 {
            put(&coordinator, &ctx, &format!("order_{i}"), i);
        }

        coordinator.join(StorageNode::new()).unwrap();
        coordinator.join(StorageNode::new()).unwrap();
        for i in 0..500 {
            assert_eq!(
                get(&coordinator, &ctx, &format!("order_{i}")),
                Some(i),
                "entry must survive rebalancing onto new nodes"
            );
        }

        let departing = coordinator.node_ids()[0].clone();
        coordinator.leave(&departing).unwrap();
        let mut total = 0;
        for id in coordinator.node_ids() {
            total += coordinator.node(&id).unwrap().cache_entry_count("orders");
        }
        assert_eq!(total, 500, "no entry may be lost when a node leaves");
        for i in 0..500 {
            assert_eq!(get(&coordinator, &ctx, &format!("order_{i}")), Some(i));
        }
    }

    #[test]
    fn test_transfer_preserves_versions() {
        let coordinator = coordinator();
        let ctx = CacheContext::new("orders", CacheOptions::default());
        put(&coordinator, &ctx, "order_1", 1);
        put(&coordinator, &ctx, "order_1", 2);

        coordinator.join(StorageNode::new()).unwrap();

        let key = "order_1".to_string();
        let partition = coordinator.route(&key);
        let owner = coordinator.owner_of(partition);
        assert_eq!(owner.entry_version("orders", partition, &key), Some(2));
    }

    struct RecordingSink {
        notifications: Mutex<Vec<GridNotification>>,
    }

    impl NotificationSink for RecordingSink {
        fn publish(&self, notification: GridNotification) {
            self.notifications.lock().push(notification);
        }
    }

    #[test]
    fn test_transfer_emits_paired_begin_end_events() {
        let sink = Arc::new(RecordingSink {
            notifications: Mutex::new(Vec::new()),
        });
        let coordinator: Arc<PartitionCoordinator<String, i64>> =
            PartitionCoordinator::bootstrap(PARTITIONS, StorageNode::new(), sink.clone());
        coordinator.join(StorageNode::new()).unwrap();

        let notifications = sink.notifications.lock();
        let transfers: Vec<_> = notifications
            .iter()
            .filter_map(|n| match n {
                GridNotification::Transfer(event) => Some(event.clone()),
                _ => None,
            })
            .collect();
        assert!(!transfers.is_empty(), "a join must move partitions");
        assert_eq!(transfers.len() % 2, 0);
        for pair in transfers.chunks(2) {
            assert_eq!(pair[0].phase, TransferPhase::Begin);
            assert_eq!(pair[1].phase, TransferPhase::End);
            assert_eq!(pair[0].partition, pair[1].partition);
            assert_eq!(pair[0].from, pair[1].from);
            assert_eq!(pair[0].to, pair[1].to);
        }
    }
}
