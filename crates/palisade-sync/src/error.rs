//! Error types for the synchronizer.

use palisade_rbac::{AccessError, PartitionKind};
use thiserror::Error;

use crate::store::StoreError;

/// Synchronization errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The action failed local validation or application.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Every replay of the action lost the version race.
    #[error("gave up committing partition {partition} after {attempts} attempts")]
    SyncConflictExhausted {
        partition: PartitionKind,
        attempts: u32,
    },

    /// Transport-level store failure. Surfaced as is, never retried.
    #[error("coordination store unavailable: {0}")]
    StoreUnavailable(String),

    /// Any other store failure (missing path, conflict outside a commit).
    #[error("coordination store error")]
    Store(#[source] StoreError),

    /// A partition payload could not be encoded or decoded.
    #[error("codec error on partition {partition}: {reason}")]
    Codec {
        partition: PartitionKind,
        reason: String,
    },

    /// Failed to start a watch thread.
    #[error("failed to spawn watcher for partition {partition}: {source}")]
    WatcherSpawn {
        partition: PartitionKind,
        source: std::io::Error,
    },

    /// The synchronizer or its store connection has been closed.
    #[error("synchronizer is closed")]
    Closed,
}

impl From<StoreError> for SyncError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(reason) => SyncError::StoreUnavailable(reason),
            StoreError::Closed => SyncError::Closed,
            other => SyncError::Store(other),
        }
    }
}

/// Result type for synchronizer operations.
pub type Result<T> = std::result::Result<T, SyncError>;
