//! Snapshot bookkeeping shared by the coordinator and the snapshot stores.

use qc_app_store::StoreError;
use serde::{Deserialize, Serialize};
use shared_types::Hash;
use thiserror::Error;

/// Most recent snapshots advertised to peers.
pub const MAX_LISTED_SNAPSHOTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("No snapshot store configured")]
    NoSnapshotStore,

    #[error("A state snapshot is already in progress")]
    InProgress,

    #[error("Snapshot {height}/{format} not found")]
    NotFound { height: u64, format: u32 },

    #[error("Snapshot {height}/{format} already exists")]
    AlreadyExists { height: u64, format: u32 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Snapshot worker stopped")]
    WorkerStopped,
}

impl From<std::io::Error> for SnapshotError {
    fn from(err: std::io::Error) -> Self {
        SnapshotError::Io(err.to_string())
    }
}

/// Metadata of a persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub height: u64,
    pub format: u32,
    /// SHA-256 of each chunk, in order.
    pub chunk_hashes: Vec<Hash>,
}

impl StoredSnapshot {
    pub fn chunk_count(&self) -> u32 {
        self.chunk_hashes.len() as u32
    }
}

/// What the background worker reports after each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Completed { height: u64, format: u32, chunks: u32, pruned: u64 },
    Failed { height: u64, reason: String },
}
