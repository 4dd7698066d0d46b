//! Key and value contracts for a cache service.
//!
//! Key and value types are pinned once, when the `CacheService` is created.
//! Keys carry a content-based equality/hash contract (used for routing and
//! for the backing maps); both keys and values must serialize so the
//! persistence coordinator can write them into snapshot files.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::hash::Hash;

/// Contract for cache keys: content-based equality and hashing, cloneable,
/// shareable across partition tasks, and serializable for snapshots.
pub trait GridKey:
    Clone + Eq + Hash + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> GridKey for T where
    T: Clone + Eq + Hash + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// Contract for cache values: cloneable, shareable, serializable.
pub trait GridValue: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> GridValue for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}
