//! # Outbound Ports (Driven Ports / SPI)
//!
//! What the runtime needs from its surroundings: a transaction decoder, a
//! signature verifier, a snapshot store, and the business-module callbacks
//! invoked at block boundaries.

use std::sync::Arc;

use crate::domain::{
    Context, RequestBeginBlock, RequestEndBlock, RequestInitChain, ResponseBeginBlock,
    ResponseEndBlock, ResponseInitChain, ResponseQuery, SnapshotError, StoredSnapshot, Tx,
};
use crate::error::Result;

/// Turns raw transaction bytes into a `Tx`.
pub trait TxDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Tx>;
}

/// External signature verification.
pub trait SignatureVerifier: Send + Sync {
    /// True if `signature` over `msg` was made by `pub_key`.
    fn verify(&self, pub_key: &[u8], msg: &[u8], signature: &[u8]) -> bool;
}

/// Persistence of exported snapshots.
pub trait SnapshotStore: Send + Sync {
    /// Persist the chunks of a snapshot and return its metadata.
    fn save(
        &self,
        height: u64,
        format: u32,
        chunks: Vec<Vec<u8>>,
    ) -> std::result::Result<StoredSnapshot, SnapshotError>;

    /// All stored snapshots, newest first.
    fn list(&self) -> std::result::Result<Vec<StoredSnapshot>, SnapshotError>;

    /// Stored checksum and data of one chunk, `None` if absent.
    fn load_chunk(
        &self,
        height: u64,
        format: u32,
        index: u32,
    ) -> std::result::Result<Option<(Vec<u8>, Vec<u8>)>, SnapshotError>;

    /// Delete all but the `retain` most recent snapshots. Returns how many
    /// were removed.
    fn prune(&self, retain: u32) -> std::result::Result<u64, SnapshotError>;
}

/// Genesis callback, run once under an infinite gas meter.
pub type InitChainer =
    Arc<dyn Fn(&Context, &RequestInitChain) -> Result<ResponseInitChain> + Send + Sync>;

pub type BeginBlocker =
    Arc<dyn Fn(&Context, &RequestBeginBlock) -> Result<ResponseBeginBlock> + Send + Sync>;

pub type EndBlocker =
    Arc<dyn Fn(&Context, &RequestEndBlock) -> Result<ResponseEndBlock> + Send + Sync>;

/// Answers `p2p/filter/{addr,id}/<value>` queries.
pub type PeerFilter = Arc<dyn Fn(&str) -> ResponseQuery + Send + Sync>;
