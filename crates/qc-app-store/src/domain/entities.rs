//! # Domain Entities for the Versioned Store
//!
//! ## Type Decisions
//!
//! - Keys and values are raw bytes. Modules namespace their keys with a
//!   prefix; the store never interprets them.
//! - A `CommitId` pairs the version with the commitment hash. Version 0 is
//!   the empty pre-genesis state and carries the zero hash.

use serde::{Deserialize, Serialize};
use shared_types::Hash;

use super::merkle::MerkleProof;

/// Snapshot format produced and accepted by this store.
pub const SNAPSHOT_FORMAT: u32 = 1;

/// Default snapshot chunk size (10 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Query path for a single key.
pub const QUERY_PATH_KEY: &str = "/key";

/// Query path for every pair under a prefix.
pub const QUERY_PATH_SUBSPACE: &str = "/subspace";

/// A pending change: `None` deletes the key.
pub type ChangeSet = Vec<(Vec<u8>, Option<Vec<u8>>)>;

/// Identifier of a committed version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommitId {
    /// Version number. Equals the block height that produced it.
    pub version: u64,
    /// Commitment hash over the full state at this version.
    pub hash: Hash,
}

impl CommitId {
    /// Hex-encoded commitment hash, for logs.
    pub fn hash_hex(&self) -> String {
        hex::encode_upper(self.hash)
    }
}

/// A key/value pair.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KvPair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KvPair {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A query routed to the store's own query interface.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StoreQuery {
    /// `/key` or `/subspace`.
    pub path: String,
    /// The key, or the prefix for subspace queries.
    pub data: Vec<u8>,
    /// Version to read. Zero reads the latest committed version.
    pub height: u64,
    /// Attach a merkle proof (key queries only).
    pub prove: bool,
}

/// Result of a store query.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StoreQueryResponse {
    pub key: Vec<u8>,
    /// Raw value for key queries, bincode-encoded `Vec<KvPair>` for subspace
    /// queries. Empty when the key is absent.
    pub value: Vec<u8>,
    pub proof: Option<MerkleProof>,
    /// The version that was actually read.
    pub height: u64,
}

/// Serialized form of a full state export.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    /// Version the items were read at.
    pub version: u64,
    /// Every live pair, sorted by key.
    pub items: Vec<KvPair>,
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// Returns `None` when no such key exists (prefix is empty or all `0xFF`),
/// meaning the range is unbounded above.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}
