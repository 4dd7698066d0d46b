//! Persistence Module
//!
//! Point-in-time named snapshots and service quiescence.
//!
//! ## Core Concepts
//! - **Consistency**: The snapshot cut holds the service quiescence gate exclusively,
//!   so no mutation lands halfway through the copy.
//! - **Layout**: One directory per snapshot with per-cache record files; `meta.json`
//!   is written last and marks the snapshot complete.
//! - **Deadlines**: Every lifecycle operation is bounded; on expiry the outcome is
//!   indeterminate and the caller reconciles by listing snapshots.

pub mod coordinator;
pub mod snapshot;
