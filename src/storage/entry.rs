use serde::{Deserialize, Serialize};

/// A stored value together with its mutation counter.
///
/// The version starts at 1 when the entry is first inserted and increases by
/// one on every successful mutation of the entry. Removal discards the entry
/// entirely; a later re-insert starts again at 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionedEntry<V> {
    pub value: V,
    pub version: u64,
}

impl<V> VersionedEntry<V> {
    pub fn initial(value: V) -> Self {
        Self { value, version: 1 }
    }

    pub fn next(&self, value: V) -> Self {
        Self {
            value,
            version: self.version + 1,
        }
    }
}
