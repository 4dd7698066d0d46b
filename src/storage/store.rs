//! Pluggable external-store hook.
//!
//! When a cache is configured with a `CacheStore`, the storage node calls
//! `load` on a cache miss (read-through) and `store`/`erase` before
//! committing a mutation (write-through). Hook errors surface to the caller
//! as `GridError::StoreFailure` and abort the mutation; they are never
//! swallowed.

use crate::types::{GridKey, GridValue};
use std::collections::HashMap;

pub trait CacheStore<K: GridKey, V: GridValue>: Send + Sync {
    /// Loads the value for `key` from the external system, or `None` if the
    /// key is absent there.
    fn load(&self, key: &K) -> anyhow::Result<Option<V>>;

    fn load_all(&self, keys: &[K]) -> anyhow::Result<HashMap<K, V>> {
        let mut loaded = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.load(key)? {
                loaded.insert(key.clone(), value);
            }
        }
        Ok(loaded)
    }

    /// Persists `value` for `key`. Called before the in-memory commit; an
    /// error aborts the mutation.
    fn store(&self, key: &K, value: &V) -> anyhow::Result<()>;

    fn store_all(&self, entries: &HashMap<K, V>) -> anyhow::Result<()> {
        for (key, value) in entries {
            self.store(key, value)?;
        }
        Ok(())
    }

    /// Removes `key` from the external system. Called before the in-memory
    /// removal; an error aborts the mutation.
    fn erase(&self, key: &K) -> anyhow::Result<()>;

    fn erase_all(&self, keys: &[K]) -> anyhow::Result<()> {
        for key in keys {
            self.erase(key)?;
        }
        Ok(())
    }

    /// All keys present in the external system.
    fn keys(&self) -> anyhow::Result<Vec<K>>;
}
