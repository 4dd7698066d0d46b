//! Secondary index structures and their maintenance.
//!
//! A `CacheIndex` maps extracted attribute values back to the keys of the
//! entries they came from, plus a forward map (key -> extracted value) so a
//! mutation can undo the previous posting without re-extracting the old
//! value. The `IndexRegistry` owns every index of one cache and is updated
//! inside the same per-entry critical section as the backing map, so an index
//! always reflects exactly the set of entries currently present.

use super::extractor::{AttributeValue, ValueExtractor};
use crate::types::{GridKey, GridValue};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

/// One secondary index: extracted value -> set of keys.
///
/// The inverted map is always a `BTreeMap`; `ordered` records whether the
/// index was registered for range queries, which is what the planner checks
/// before resolving a range predicate against it.
pub struct CacheIndex<K> {
    extractor_id: String,
    ordered: bool,
    forward: HashMap<K, AttributeValue>,
    inverted: BTreeMap<AttributeValue, HashSet<K>>,
}

impl<K: GridKey> CacheIndex<K> {
    fn new(extractor_id: String, ordered: bool) -> Self {
        Self {
            extractor_id,
            ordered,
            forward: HashMap::new(),
            inverted: BTreeMap::new(),
        }
    }

    pub fn extractor_id(&self) -> &str {
        &self.extractor_id
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// Number of entries currently covered by this index.
    pub fn entry_count(&self) -> usize {
        self.forward.len()
    }

    /// Keys whose extracted value equals `value`.
    pub fn lookup(&self, value: &AttributeValue) -> HashSet<K> {
        self.inverted.get(value).cloned().unwrap_or_default()
    }

    /// Keys whose extracted value falls within the given bounds.
    pub fn lookup_range(
        &self,
        lower: Bound<&AttributeValue>,
        upper: Bound<&AttributeValue>,
    ) -> HashSet<K> {
        let mut keys = HashSet::new();
        for (_, posting) in self.inverted.range((lower, upper)) {
            keys.extend(posting.iter().cloned());
        }
        keys
    }

    pub fn cardinality(&self, value: &AttributeValue) -> usize {
        self.inverted.get(value).map(|keys| keys.len()).unwrap_or(0)
    }

    pub fn range_cardinality(
        &self,
        lower: Bound<&AttributeValue>,
        upper: Bound<&AttributeValue>,
    ) -> usize {
        self.inverted
            .range((lower, upper))
            .map(|(_, posting)| posting.len())
            .sum()
    }

    /// Replaces the posting for `key`. `None` removes the key entirely
    /// (entry removed, or its new value failed extraction).
    fn apply(&mut self, key: &K, new: Option<AttributeValue>) {
        if let Some(old) = self.forward.remove(key) {
            if let Some(posting) = self.inverted.get_mut(&old) {
                posting.remove(key);
                if posting.is_empty() {
                    self.inverted.remove(&old);
                }
            }
        }
        if let Some(value) = new {
            self.forward.insert(key.clone(), value.clone());
            self.inverted.entry(value).or_default().insert(key.clone());
        }
    }

    fn truncate(&mut self) {
        self.forward.clear();
        self.inverted.clear();
    }
}

struct IndexSlot<K, V> {
    extractor: Arc<dyn ValueExtractor<V>>,
    index: CacheIndex<K>,
}

/// All secondary indexes of one cache.
pub struct IndexRegistry<K, V> {
    slots: RwLock<HashMap<String, IndexSlot<K, V>>>,
}

impl<K: GridKey, V: GridValue> IndexRegistry<K, V> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Builds an index over the given current entries in one pass and
    /// registers it. Re-adding an extractor id replaces the old index.
    ///
    /// Entries whose extraction fails are excluded and logged; they simply do
    /// not appear in the index (and an indexed query will not match them).
    pub fn add_index(
        &self,
        extractor: Arc<dyn ValueExtractor<V>>,
        ordered: bool,
        entries: &HashMap<K, V>,
    ) {
        let id = extractor.id().to_string();
        let mut index = CacheIndex::new(id.clone(), ordered);
        for (key, value) in entries {
            match extractor.extract(value) {
                Ok(attr) => index.apply(key, Some(attr)),
                Err(e) => {
                    tracing::warn!(extractor = %id, reason = %e, "extraction failed; entry excluded from index");
                }
            }
        }
        tracing::info!(extractor = %id, ordered, entries = index.entry_count(), "index registered");
        self.slots.write().insert(id, IndexSlot { extractor, index });
    }

    /// Discards the index for `extractor_id`. Returns false if no such index.
    pub fn remove_index(&self, extractor_id: &str) -> bool {
        let removed = self.slots.write().remove(extractor_id).is_some();
        if removed {
            tracing::info!(extractor = %extractor_id, "index removed");
        }
        removed
    }

    pub fn has_index(&self, extractor_id: &str) -> bool {
        self.slots.read().contains_key(extractor_id)
    }

    pub fn has_ordered_index(&self, extractor_id: &str) -> bool {
        self.slots
            .read()
            .get(extractor_id)
            .map(|slot| slot.index.is_ordered())
            .unwrap_or(false)
    }

    pub fn index_ids(&self) -> Vec<String> {
        self.slots.read().keys().cloned().collect()
    }

    /// Applies one entry mutation to every index. Called from inside the
    /// partition critical section, right after the backing-map commit.
    /// `new_value = None` means the entry was removed.
    pub fn on_mutation(&self, key: &K, new_value: Option<&V>) {
        let mut slots = self.slots.write();
        if slots.is_empty() {
            return;
        }
        for slot in slots.values_mut() {
            match new_value {
                None => slot.index.apply(key, None),
                Some(value) => match slot.extractor.extract(value) {
                    Ok(attr) => slot.index.apply(key, Some(attr)),
                    Err(e) => {
                        // The old posting is gone and no new one is added:
                        // the entry is excluded from this index only.
                        slot.index.apply(key, None);
                        tracing::warn!(
                            extractor = slot.extractor.id(),
                            reason = %e,
                            "extraction failed; entry excluded from index"
                        );
                    }
                },
            }
        }
    }

    /// Runs `f` against the index for `extractor_id` under the registry read
    /// lock. Returns `None` if the index does not exist.
    pub fn with_index<R>(&self, extractor_id: &str, f: impl FnOnce(&CacheIndex<K>) -> R) -> Option<R> {
        self.slots.read().get(extractor_id).map(|slot| f(&slot.index))
    }

    /// Empties every index but keeps the definitions. Used by bulk truncation.
    pub fn clear(&self) {
        for slot in self.slots.write().values_mut() {
            slot.index.truncate();
        }
    }

    /// Rebuilds every registered index from scratch. Used after snapshot
    /// recovery, when the whole data set has been replaced.
    pub fn rebuild(&self, entries: &HashMap<K, V>) {
        let mut slots = self.slots.write();
        for slot in slots.values_mut() {
            slot.index.truncate();
            for (key, value) in entries {
                match slot.extractor.extract(value) {
                    Ok(attr) => slot.index.apply(key, Some(attr)),
                    Err(e) => {
                        tracing::warn!(
                            extractor = slot.extractor.id(),
                            reason = %e,
                            "extraction failed during rebuild; entry excluded"
                        );
                    }
                }
            }
        }
    }
}

impl<K: GridKey, V: GridValue> Default for IndexRegistry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
