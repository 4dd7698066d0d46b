//! Cache Service Module
//!
//! The public face of the grid.
//!
//! ## Core Concepts
//! - **Service**: `CacheService` is the unit of co-located caches, nodes, and snapshots;
//!   key/value types are pinned at service creation.
//! - **Façade**: `NamedCache` exposes the async operation surface and retries stale
//!   routing transparently.
//! - **Context**: Per-cache wiring (indexes, events, store, authorizer) shared by all nodes.

pub mod context;
pub mod facade;
pub mod service;
