//! Partitioned In-Memory Data Grid Library
//!
//! This library crate implements an embeddable, partitioned, versioned
//! key/value grid with server-side computation.
//!
//! ## Architecture Modules
//! The engine is composed of loosely coupled subsystems:
//!
//! - **`cluster`**: The topology layer. Assigns partitions to storage nodes and
//!   rebalances them on membership changes with atomic ownership flips.
//! - **`storage`**: The state layer. Per-partition backing maps, entry versioning,
//!   and the single commit pipeline every mutation flows through.
//! - **`index`**: Extractor-driven secondary indexes maintained in lockstep with
//!   the backing maps.
//! - **`query`**: Composable filter trees and the index-aware planner.
//! - **`processor`**: Entry processors and aggregators, executed where the data lives.
//! - **`events`**: Two-phase entry events; pre-commit interceptors can veto,
//!   post-commit listeners observe.
//! - **`security`**: Per-cache storage access authorization.
//! - **`persistence`**: Named point-in-time snapshots with suspend/resume quiescence.
//! - **`cache`**: The `CacheService`/`NamedCache` façade tying it all together.

pub mod cache;
pub mod cluster;
pub mod config;
pub mod error;
pub mod events;
pub mod index;
pub mod persistence;
pub mod processor;
pub mod query;
pub mod security;
pub mod storage;
pub mod types;

pub use cache::context::CacheOptions;
pub use cache::facade::NamedCache;
pub use cache::service::CacheService;
pub use config::GridConfig;
pub use error::{GridError, GridResult};
pub use query::filter::{CompareOp, Filter};
pub use security::Principal;
