//! Service configuration.
//!
//! All tunables are passed in at construction; there is no process-global
//! state. The partition count is fixed for the lifetime of a service:
//! key-to-partition routing must never change once data has been stored.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Number of partitions the keyspace is divided into. Fixed at service
    /// creation; a prime spreads keys evenly under modulo routing.
    pub partition_count: u32,

    /// How many times the façade re-resolves ownership and retries after a
    /// `WrongNode` response before giving up.
    pub max_route_retries: usize,

    /// Bounded wait for snapshot create/recover/remove operations. Elapsing
    /// yields `GridError::Timeout` with an indeterminate outcome.
    pub snapshot_deadline: Duration,

    /// Root directory for snapshot storage. Snapshots live under
    /// `<root>/<service>/<snapshot name>/`.
    pub snapshot_root: PathBuf,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            partition_count: 257,
            max_route_retries: 8,
            snapshot_deadline: Duration::from_secs(30),
            snapshot_root: std::env::temp_dir().join("datagrid"),
        }
    }
}

impl GridConfig {
    pub fn with_partition_count(mut self, count: u32) -> Self {
        self.partition_count = count;
        self
    }

    pub fn with_snapshot_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.snapshot_root = root.into();
        self
    }

    pub fn with_snapshot_deadline(mut self, deadline: Duration) -> Self {
        self.snapshot_deadline = deadline;
        self
    }
}
