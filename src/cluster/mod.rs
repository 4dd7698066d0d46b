//! Cluster Topology Module
//!
//! Owns partition-to-node assignment and rebalancing.
//!
//! ## Core Concepts
//! - **Routing**: Stable key hashing maps every key to one of a fixed number of partitions.
//! - **Placement**: `PartitionCoordinator` assigns each partition to exactly one node.
//! - **Rebalancing**: Membership changes move partitions one at a time, flipping ownership
//!   atomically under the partition's store locks.
//! - **Notifications**: Transfer begin/end events are published to a `NotificationSink`.

pub mod coordinator;
pub mod types;

#[cfg(test)]
mod tests;
