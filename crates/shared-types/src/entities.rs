//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Chain**: `BlockHeader`, `ConsensusParams`
//! - **Validators**: `ValidatorUpdate`, `VoteInfo`, `LastCommitInfo`
//! - **Results**: `Event`, `EventAttribute`
//! - **Accounts**: `Address` and its derivation from a public key

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::errors::AddressError;

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// A 32-byte hash.
pub type Hash = [u8; 32];

/// A 20-byte account address.
pub type Address = [u8; 20];

/// Block height. Height 0 is the state before the first block.
pub type Height = u64;

/// Header of the block currently being executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    /// Chain identifier, fixed at genesis.
    pub chain_id: String,
    /// Block height.
    pub height: Height,
    /// Block time in unix seconds.
    pub time: u64,
    /// Address of the validator that proposed this block.
    pub proposer_address: Vec<u8>,
    /// Commitment hash of the previous block's state.
    pub app_hash: Vec<u8>,
}

/// Block size and gas limits agreed by consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParams {
    /// Maximum block size in bytes.
    pub max_bytes: i64,
    /// Maximum gas per block. Zero or negative means unlimited.
    pub max_gas: i64,
}

impl Default for BlockParams {
    fn default() -> Self {
        Self {
            max_bytes: 22_020_096,
            max_gas: -1,
        }
    }
}

/// Consensus parameters stashed at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConsensusParams {
    /// Block limits.
    pub block: Option<BlockParams>,
}

impl ConsensusParams {
    /// Maximum block gas, if a positive limit is configured.
    pub fn max_block_gas(&self) -> Option<u64> {
        match self.block {
            Some(params) if params.max_gas > 0 => Some(params.max_gas as u64),
            _ => None,
        }
    }
}

// =============================================================================
// CLUSTER B: VALIDATORS
// =============================================================================

/// A change to the validator set.
///
/// Ordered by public key then power so two sets can be compared after
/// sorting regardless of the order the caller supplied them in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    /// Consensus public key bytes.
    pub pub_key: Vec<u8>,
    /// Voting power. Zero removes the validator.
    pub power: i64,
}

impl ValidatorUpdate {
    pub fn new(pub_key: impl Into<Vec<u8>>, power: i64) -> Self {
        Self {
            pub_key: pub_key.into(),
            power,
        }
    }
}

/// A validator as seen in the last commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Validator {
    /// Validator address.
    pub address: Vec<u8>,
    /// Voting power.
    pub power: i64,
}

/// Whether a validator signed the previous block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VoteInfo {
    pub validator: Validator,
    pub signed_last_block: bool,
}

/// Votes for the previous block, handed to BeginBlock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LastCommitInfo {
    pub round: i32,
    pub votes: Vec<VoteInfo>,
}

// =============================================================================
// CLUSTER C: RESULTS
// =============================================================================

/// A key/value attribute of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

/// A typed event emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event type, e.g. `transfer` or `message`.
    pub kind: String,
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    /// Create an event with no attributes.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    /// Builder method to append an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(EventAttribute {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Look up the first attribute with the given key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }
}

// =============================================================================
// CLUSTER D: ACCOUNTS
// =============================================================================

/// Derive an account address from public key bytes.
///
/// Last 20 bytes of Keccak256 over the encoded key, the same derivation for
/// every key kind.
pub fn address_from_pubkey(pub_key: &[u8]) -> Address {
    let digest = Keccak256::digest(pub_key);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}

/// Parse a hex address, with or without a `0x` prefix.
pub fn parse_address(s: &str) -> Result<Address, AddressError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
    if bytes.len() != 20 {
        return Err(AddressError::InvalidLength {
            expected: 20,
            actual: bytes.len(),
        });
    }
    let mut address = [0u8; 20];
    address.copy_from_slice(&bytes);
    Ok(address)
}

/// Hex-encode an address with a `0x` prefix.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}
