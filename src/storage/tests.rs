//! Storage Module Tests
//!
//! Validates the per-entry commit pipeline and storage node mechanics.
//!
//! ## Test Scopes
//! - **Versioning**: Version starts at 1, increments per mutation, restarts after removal.
//! - **Ownership**: `WrongNode` is raised inside the critical section.
//! - **CacheStore**: Read-through installs at version 1; hook failures abort the mutation.

#[cfg(test)]
mod tests {
    use crate::cache::context::{CacheContext, CacheOptions};
    use crate::error::GridError;
    use crate::security::{AccessReason, Principal};
    use crate::storage::node::StorageNode;
    use crate::storage::store::CacheStore;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Account {
        owner: String,
        balance: i64,
    }

    fn account(owner: &str, balance: i64) -> Account {
        Account {
            owner: owner.to_string(),
            balance,
        }
    }

    const PARTITION: u32 = 7;

    fn node_and_ctx() -> (
        Arc<StorageNode<String, Account>>,
        CacheContext<String, Account>,
    ) {
        let node = StorageNode::new();
        for p in 0..16 {
            node.assign_partition(p);
        }
        (node, CacheContext::new("accounts", CacheOptions::default()))
    }

    fn put(
        node: &StorageNode<String, Account>,
        ctx: &CacheContext<String, Account>,
        key: &str,
        value: Account,
    ) -> Result<Option<Account>, GridError> {
        node.mutate(
            ctx,
            PARTITION,
            &key.to_string(),
            &Principal::new("test"),
            AccessReason::Put,
            move |entry| {
                let previous = entry.value().cloned();
                entry.set_value(value);
                Ok(previous)
            },
        )
    }

    fn remove(
        node: &StorageNode<String, Account>,
        ctx: &CacheContext<String, Account>,
        key: &str,
    ) -> Result<Option<Account>, GridError> {
        node.mutate(
            ctx,
            PARTITION,
            &key.to_string(),
            &Principal::new("test"),
            AccessReason::Remove,
            |entry| {
                let previous = entry.value().cloned();
                entry.remove();
                Ok(previous)
            },
        )
    }

    // ============================================================
    // VERSIONING TESTS
    // ============================================================

    #[test]
    fn test_read_your_write() {
        let (node, ctx) = node_and_ctx();
        put(&node, &ctx, "a1", account("alice", 100)).unwrap();

        let read = node
            .get(&ctx, PARTITION, &"a1".to_string(), &Principal::new("test"))
            .unwrap();
        assert_eq!(read, Some(account("alice", 100)));
    }

    #[test]
    fn test_version_starts_at_one_and_increments() {
        let (node, ctx) = node_and_ctx();
        put(&node, &ctx, "a1", account("alice", 100)).unwrap();
        assert_eq!(
            node.entry_version("accounts", PARTITION, &"a1".to_string()),
            Some(1)
        );

        put(&node, &ctx, "a1", account("alice", 150)).unwrap();
        put(&node, &ctx, "a1", account("alice", 200)).unwrap();
        assert_eq!(
            node.entry_version("accounts", PARTITION, &"a1".to_string()),
            Some(3),
            "every successful mutation should bump the version by one"
        );
    }

    #[test]
    fn test_reinsert_restarts_version_at_one() {
        let (node, ctx) = node_and_ctx();
        put(&node, &ctx, "a1", account("alice", 100)).unwrap();
        put(&node, &ctx, "a1", account("alice", 150)).unwrap();
        remove(&node, &ctx, "a1").unwrap();
        assert_eq!(node.entry_version("accounts", PARTITION, &"a1".to_string()), None);

        put(&node, &ctx, "a1", account("alice", 1)).unwrap();
        assert_eq!(
            node.entry_version("accounts", PARTITION, &"a1".to_string()),
            Some(1),
            "removal discards the version; a re-insert starts over"
        );
    }

    #[test]
    fn test_remove_absent_entry_is_noop() {
        let (node, ctx) = node_and_ctx();
        let previous = remove(&node, &ctx, "ghost").unwrap();
        assert_eq!(previous, None);
    }

    #[test]
    fn test_put_returns_previous_value() {
        let (node, ctx) = node_and_ctx();
        assert_eq!(put(&node, &ctx, "a1", account("alice", 100)).unwrap(), None);
        assert_eq!(
            put(&node, &ctx, "a1", account("alice", 200)).unwrap(),
            Some(account("alice", 100))
        );
    }

    #[test]
    fn test_failed_mutator_leaves_entry_untouched() {
        let (node, ctx) = node_and_ctx();
        put(&node, &ctx, "a1", account("alice", 100)).unwrap();

        let outcome: Result<(), GridError> = node.mutate(
            &ctx,
            PARTITION,
            &"a1".to_string(),
            &Principal::new("test"),
            AccessReason::Invoke,
            |entry| {
                entry.set_value(account("alice", -1));
                anyhow::bail!("balance must not go negative")
            },
        );
        assert!(matches!(outcome, Err(GridError::ProcessorFailed { .. })));

        let read = node
            .get(&ctx, PARTITION, &"a1".to_string(), &Principal::new("test"))
            .unwrap();
        assert_eq!(read, Some(account("alice", 100)), "staged value must not commit");
        assert_eq!(
            node.entry_version("accounts", PARTITION, &"a1".to_string()),
            Some(1)
        );
    }

    // ============================================================
    // OWNERSHIP TESTS
    // ============================================================

    #[test]
    fn test_unowned_partition_returns_wrong_node() {
        let node: Arc<StorageNode<String, Account>> = StorageNode::new();
        let ctx = CacheContext::new("accounts", CacheOptions::default());

        let outcome = put(&node, &ctx, "a1", account("alice", 100));
        assert!(matches!(outcome, Err(GridError::WrongNode { partition: PARTITION, .. })));

        let read = node.get(&ctx, PARTITION, &"a1".to_string(), &Principal::new("test"));
        assert!(matches!(read, Err(GridError::WrongNode { .. })));
    }

    // ============================================================
    // CACHE STORE TESTS
    // ============================================================

    struct RecordingStore {
        backing: Mutex<HashMap<String, Account>>,
        loads: AtomicUsize,
        fail_writes: bool,
    }

    impl RecordingStore {
        fn new(fail_writes: bool) -> Self {
            Self {
                backing: Mutex::new(HashMap::new()),
                loads: AtomicUsize::new(0),
                fail_writes,
            }
        }

        fn seeded(entries: &[(&str, Account)]) -> Self {
            let store = Self::new(false);
            {
                let mut backing = store.backing.lock();
                for (key, value) in entries {
                    backing.insert(key.to_string(), value.clone());
                }
            }
            store
        }
    }

    impl CacheStore<String, Account> for RecordingStore {
        fn load(&self, key: &String) -> anyhow::Result<Option<Account>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.backing.lock().get(key).cloned())
        }

        fn store(&self, key: &String, value: &Account) -> anyhow::Result<()> {
            if self.fail_writes {
                anyhow::bail!("external system unavailable");
            }
            self.backing.lock().insert(key.clone(), value.clone());
            Ok(())
        }

        fn erase(&self, key: &String) -> anyhow::Result<()> {
            if self.fail_writes {
                anyhow::bail!("external system unavailable");
            }
            self.backing.lock().remove(key);
            Ok(())
        }

        fn keys(&self) -> anyhow::Result<Vec<String>> {
            Ok(self.backing.lock().keys().cloned().collect())
        }
    }

    #[test]
    fn test_read_through_installs_at_version_one() {
        let store = Arc::new(RecordingStore::seeded(&[("a1", account("alice", 42))]));
        let node: Arc<StorageNode<String, Account>> = StorageNode::new();
        node.assign_partition(PARTITION);
        let ctx = CacheContext::new(
            "accounts",
            CacheOptions::default().with_store(store.clone()),
        );

        let read = node
            .get(&ctx, PARTITION, &"a1".to_string(), &Principal::new("test"))
            .unwrap();
        assert_eq!(read, Some(account("alice", 42)));
        assert_eq!(
            node.entry_version("accounts", PARTITION, &"a1".to_string()),
            Some(1),
            "a loaded entry is installed at version 1"
        );

        // Second read hits the installed entry, not the store.
        node.get(&ctx, PARTITION, &"a1".to_string(), &Principal::new("test"))
            .unwrap();
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_store_failure_aborts_mutation() {
        let store = Arc::new(RecordingStore::new(true));
        let node: Arc<StorageNode<String, Account>> = StorageNode::new();
        node.assign_partition(PARTITION);
        let ctx = CacheContext::new("accounts", CacheOptions::default().with_store(store));

        let outcome = put(&node, &ctx, "a1", account("alice", 100));
        assert!(matches!(outcome, Err(GridError::StoreFailure { .. })));
        assert_eq!(
            node.entry_version("accounts", PARTITION, &"a1".to_string()),
            None,
            "a failed write-through must leave the backing map untouched"
        );
    }

    #[test]
    fn test_write_through_reaches_external_store() {
        let store = Arc::new(RecordingStore::new(false));
        let node: Arc<StorageNode<String, Account>> = StorageNode::new();
        node.assign_partition(PARTITION);
        let ctx = CacheContext::new(
            "accounts",
            CacheOptions::default().with_store(store.clone()),
        );

        put(&node, &ctx, "a1", account("alice", 100)).unwrap();
        assert_eq!(
            store.backing.lock().get("a1"),
            Some(&account("alice", 100))
        );

        remove(&node, &ctx, "a1").unwrap();
        assert!(store.backing.lock().get("a1").is_none());
    }
}
