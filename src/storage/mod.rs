//! Partitioned Storage Module
//!
//! Implements the partitioned, versioned in-memory backing store.
//!
//! ## Core Concepts
//! - **Partitioning**: Entries are divided into fixed partitions based on key hashing.
//! - **Versioning**: Every entry carries a version that starts at 1 and increments per mutation.
//! - **Pipeline**: `StorageNode::mutate` is the single commit path (authorizer, events,
//!   cache store, backing map, indexes) used by put, remove, and processor invocation.
//! - **Integration**: `CacheStore` provides read-through and write-through hooks to an
//!   external system of record.

pub mod entry;
pub mod node;
pub mod store;

#[cfg(test)]
mod tests;
