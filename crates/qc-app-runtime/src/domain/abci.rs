//! Request/response types of the block-lifecycle, query and snapshot
//! protocols spoken with the consensus engine.

use qc_app_store::MerkleProof;
use serde::{Deserialize, Serialize};
use shared_types::{
    BlockHeader, ConsensusParams, Event, LastCommitInfo, ValidatorUpdate,
};

use super::entities::{GasInfo, TxResult};
use crate::error::{TxError, CODE_OK, ROOT_CODESPACE};

// =============================================================================
// LIFECYCLE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestInitChain {
    /// Genesis time in unix seconds.
    pub time: u64,
    pub chain_id: String,
    pub consensus_params: Option<ConsensusParams>,
    /// Validators proposed by consensus. Empty means "use the genesis set".
    pub validators: Vec<ValidatorUpdate>,
    /// Raw genesis application state.
    pub app_state_bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseInitChain {
    pub consensus_params: Option<ConsensusParams>,
    pub validators: Vec<ValidatorUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseInfo {
    /// Application name.
    pub data: String,
    pub version: String,
    pub last_block_height: u64,
    pub last_block_app_hash: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestBeginBlock {
    pub hash: Vec<u8>,
    pub header: BlockHeader,
    pub last_commit_info: LastCommitInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseBeginBlock {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CheckTxKind {
    #[default]
    New,
    Recheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestCheckTx {
    pub tx: Vec<u8>,
    pub kind: CheckTxKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestDeliverTx {
    pub tx: Vec<u8>,
}

/// Response to CheckTx and DeliverTx. Always carries the gas figures.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseTx {
    pub code: u32,
    pub data: Vec<u8>,
    pub log: String,
    pub gas_wanted: u64,
    pub gas_used: u64,
    pub events: Vec<Event>,
    pub codespace: String,
}

pub type ResponseCheckTx = ResponseTx;
pub type ResponseDeliverTx = ResponseTx;

impl ResponseTx {
    pub fn from_result(gas: GasInfo, result: TxResult) -> Self {
        Self {
            code: CODE_OK,
            data: result.data,
            log: result.log,
            gas_wanted: gas.gas_wanted,
            gas_used: gas.gas_used,
            events: result.events,
            codespace: String::new(),
        }
    }

    pub fn from_error(gas: GasInfo, err: &TxError) -> Self {
        Self {
            code: err.code(),
            data: Vec::new(),
            log: err.to_string(),
            gas_wanted: gas.gas_wanted,
            gas_used: gas.gas_used,
            events: Vec::new(),
            codespace: err.codespace().to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestEndBlock {
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseEndBlock {
    pub validator_updates: Vec<ValidatorUpdate>,
    pub consensus_param_updates: Option<ConsensusParams>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseCommit {
    /// Commitment hash of the new version.
    pub data: Vec<u8>,
}

// =============================================================================
// QUERY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestQuery {
    pub data: Vec<u8>,
    pub path: String,
    /// Zero means latest.
    pub height: u64,
    pub prove: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseQuery {
    pub code: u32,
    pub log: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub proof: Option<MerkleProof>,
    pub height: u64,
    pub codespace: String,
}

impl ResponseQuery {
    pub fn from_error(err: &TxError) -> Self {
        Self {
            code: err.code(),
            log: err.to_string(),
            codespace: err.codespace().to_string(),
            ..Default::default()
        }
    }

    /// Successful response carrying `value` at `height`.
    pub fn with_value(value: Vec<u8>, height: u64) -> Self {
        Self {
            value,
            height,
            codespace: ROOT_CODESPACE.to_string(),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

// =============================================================================
// STATE SYNC
// =============================================================================

/// Advertised snapshot. Identity is `(height, format)`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub height: u64,
    pub format: u32,
    pub chunks: u32,
    /// Bincode-encoded chunk checksums.
    pub metadata: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SnapshotChunk {
    pub height: u64,
    pub format: u32,
    pub index: u32,
    /// SHA-256 of `data`.
    pub checksum: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseListSnapshots {
    pub snapshots: Vec<Snapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestLoadSnapshotChunk {
    pub height: u64,
    pub format: u32,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseLoadSnapshotChunk {
    pub chunk: Option<SnapshotChunk>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestOfferSnapshot {
    pub snapshot: Option<Snapshot>,
    /// Commitment the restored state is expected to reproduce.
    pub app_hash: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OfferRejectReason {
    #[default]
    None,
    InvalidFormat,
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseOfferSnapshot {
    pub accepted: bool,
    pub reason: OfferRejectReason,
}

impl ResponseOfferSnapshot {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: OfferRejectReason::None,
        }
    }

    pub fn rejected(reason: OfferRejectReason) -> Self {
        Self {
            accepted: false,
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestApplySnapshotChunk {
    pub chunk: Option<SnapshotChunk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ApplyRejectReason {
    #[default]
    None,
    /// Checksum mismatch. The chunk may be refetched.
    VerifyFailed,
    /// Not the next expected chunk. The chunk may be resent in order.
    Unexpected,
    /// Restoration aborted.
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseApplySnapshotChunk {
    pub applied: bool,
    pub reason: ApplyRejectReason,
}

impl ResponseApplySnapshotChunk {
    pub fn applied() -> Self {
        Self {
            applied: true,
            reason: ApplyRejectReason::None,
        }
    }

    pub fn rejected(reason: ApplyRejectReason) -> Self {
        Self {
            applied: false,
            reason,
        }
    }
}
