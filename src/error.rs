//! Error taxonomy for grid operations.
//!
//! Every failure a caller can observe maps to one `GridError` variant, and the
//! variant tells the caller what to do next:
//!
//! - `WrongNode` — stale routing; always safe to retry after refreshing the
//!   partition map (the façade does this internally).
//! - `Vetoed` — a pre-commit interceptor rejected the mutation; not retried.
//! - `StoreFailure` — the external `CacheStore` hook failed; the mutation was
//!   not applied.
//! - `ExtractionFailure` — a value extractor failed for one entry; the entry
//!   is excluded from the index/result, never fatal to the cache.
//! - `Timeout` — a bounded wait elapsed; the outcome is indeterminate and the
//!   caller must reconcile explicitly (e.g. re-list snapshots).
//! - `AccessDenied` — the authorizer rejected the operation; never retried.

use crate::cluster::types::NodeId;
use thiserror::Error;

pub type GridResult<T> = Result<T, GridError>;

#[derive(Debug, Error)]
pub enum GridError {
    /// The addressed node does not own the key's partition. Refresh the
    /// partition map and retry; always safe.
    #[error("partition {partition} is not owned by node {node}; refresh routing and retry")]
    WrongNode { partition: u32, node: NodeId },

    /// A pre-commit interceptor rejected the mutation. Nothing was applied.
    #[error("mutation vetoed by interceptor: {reason}")]
    Vetoed { reason: String },

    /// The external cache store hook failed. The mutation was rolled back.
    #[error("cache store hook failed: {reason}")]
    StoreFailure { reason: String },

    /// A value extractor failed for one entry.
    #[error("extractor '{extractor}' failed: {reason}")]
    ExtractionFailure { extractor: String, reason: String },

    /// A bounded wait elapsed before completion was confirmed. The outcome is
    /// indeterminate; the caller must reconcile (e.g. re-list snapshots).
    #[error("operation '{operation}' did not complete within {waited_ms}ms; outcome indeterminate")]
    Timeout { operation: String, waited_ms: u64 },

    /// The storage access authorizer denied the operation.
    #[error("access denied for principal '{principal}': {reason}")]
    AccessDenied { principal: String, reason: String },

    /// A user-supplied entry processor returned an error for this entry.
    #[error("entry processor failed: {reason}")]
    ProcessorFailed { reason: String },

    #[error("snapshot '{0}' already exists")]
    SnapshotExists(String),

    #[error("snapshot '{0}' not found or incomplete")]
    SnapshotNotFound(String),

    /// A snapshot or recovery background task failed outright (as opposed to
    /// timing out with an indeterminate outcome).
    #[error("persistence task failed: {reason}")]
    SnapshotFailed { reason: String },

    /// Invalid cluster topology change, e.g. removing the last storage node.
    #[error("cluster topology error: {0}")]
    Topology(String),

    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl GridError {
    /// True for errors the caller may retry verbatim after refreshing routing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GridError::WrongNode { .. })
    }
}
