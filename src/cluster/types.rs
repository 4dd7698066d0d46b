use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a storage node within a cache service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ownership state of one partition.
///
/// `Transferring` means the source keeps serving reads and writes until the
/// flip; the destination starts serving only once the state becomes
/// `Owned(to)`. The flip itself happens under the partition's store locks, so
/// there is never a window where two nodes accept writes for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionState {
    Owned(NodeId),
    Transferring { from: NodeId, to: NodeId },
}

impl PartitionState {
    /// The node currently serving requests for this partition.
    pub fn serving_node(&self) -> &NodeId {
        match self {
            PartitionState::Owned(node) => node,
            PartitionState::Transferring { from, .. } => from,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransferPhase {
    Begin,
    End,
}

/// Notification of a partition ownership change during rebalancing.
/// Observational only; consumers cannot veto a transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferEvent {
    pub partition: u32,
    pub phase: TransferPhase,
    pub from: NodeId,
    pub to: NodeId,
}

/// Notifications published by the grid for external logging/metrics tooling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum GridNotification {
    Transfer(TransferEvent),
    SnapshotBegin { name: String },
    SnapshotEnd { name: String },
    RecoveryBegin { name: String },
    RecoveryEnd { name: String },
}

/// Sink for grid notifications. Implementations must not block: publication
/// happens inline on coordinator and persistence threads.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: GridNotification);
}

/// Default sink: structured log lines via `tracing`.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn publish(&self, notification: GridNotification) {
        match &notification {
            GridNotification::Transfer(event) => {
                tracing::info!(
                    partition = event.partition,
                    from = %event.from,
                    to = %event.to,
                    phase = ?event.phase,
                    "partition transfer"
                );
            }
            other => {
                tracing::info!(notification = ?other, "persistence notification");
            }
        }
    }
}
