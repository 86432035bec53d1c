use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Version {version} not available (earliest {earliest}, latest {latest})")]
    VersionNotFound {
        version: u64,
        earliest: u64,
        latest: u64,
    },

    #[error("Store is read-only")]
    ReadOnly,

    #[error("Unknown store query path: {0}")]
    UnknownQueryPath(String),

    #[error("Unsupported snapshot format: {format}")]
    UnsupportedFormat { format: u32 },

    #[error("Cannot snapshot height {height}: latest committed height is {latest}")]
    InvalidSnapshotHeight { height: u64, latest: u64 },

    #[error("Cannot restore into a store that already holds version {version}")]
    NotEmpty { version: u64 },

    #[error("Snapshot payload is for version {found}, expected {expected}")]
    SnapshotVersionMismatch { expected: u64, found: u64 },

    #[error("Snapshot commitment {actual} does not match expected {expected}")]
    AppHashMismatch { expected: String, actual: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}
