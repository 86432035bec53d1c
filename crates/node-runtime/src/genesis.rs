//! # Genesis Document
//!
//! JSON file describing the initial chain:
//!
//! ```json
//! {
//!   "chain_id": "quantum-chain-1",
//!   "genesis_time": 1700000000,
//!   "consensus_params": { "block": { "max_bytes": 1048576, "max_gas": 10000000 } },
//!   "validators": [],
//!   "app_state": { "bank": { "balances": [ { "address": "0x..", "coins": [ { "denom": "uqc", "amount": 1000 } ] } ] } }
//! }
//! ```

use crate::bank::{AppGenesis, GenesisBalance, GenesisState, DEFAULT_DENOM};
use qc_app_runtime::{Coin, Coins, RequestInitChain};
use serde::{Deserialize, Serialize};
use shared_types::{format_address, parse_address, Address, ConsensusParams, ValidatorUpdate};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("Failed to read genesis file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed genesis JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid genesis: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDoc {
    pub chain_id: String,
    /// Unix seconds.
    pub genesis_time: u64,
    #[serde(default)]
    pub consensus_params: Option<ConsensusParams>,
    #[serde(default)]
    pub validators: Vec<ValidatorUpdate>,
    #[serde(default)]
    pub app_state: AppGenesis,
}

impl GenesisDoc {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GenesisError> {
        let bytes = std::fs::read(path)?;
        let doc: GenesisDoc = serde_json::from_slice(&bytes)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Single-account development genesis.
    pub fn dev(chain_id: &str, genesis_time: u64, faucet: Address, amount: u128) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            genesis_time,
            consensus_params: None,
            validators: Vec::new(),
            app_state: AppGenesis {
                bank: GenesisState {
                    balances: vec![GenesisBalance {
                        address: format_address(&faucet),
                        coins: Coins::new(vec![Coin::new(DEFAULT_DENOM, amount)]),
                    }],
                },
            },
        }
    }

    pub fn validate(&self) -> Result<(), GenesisError> {
        if self.chain_id.trim().is_empty() {
            return Err(GenesisError::Invalid("chain_id must not be empty".into()));
        }
        if let Some(max_gas) = self
            .consensus_params
            .as_ref()
            .and_then(|params| params.block)
            .map(|block| block.max_gas)
        {
            if max_gas == 0 || max_gas < -1 {
                return Err(GenesisError::Invalid(format!(
                    "block.max_gas must be -1 or positive, got {max_gas}"
                )));
            }
        }
        for balance in &self.app_state.bank.balances {
            parse_address(&balance.address).map_err(|e| {
                GenesisError::Invalid(format!("balance address {}: {e}", balance.address))
            })?;
        }
        Ok(())
    }

    pub fn init_chain_request(&self) -> Result<RequestInitChain, GenesisError> {
        Ok(RequestInitChain {
            time: self.genesis_time,
            chain_id: self.chain_id.clone(),
            consensus_params: self.consensus_params.clone(),
            validators: self.validators.clone(),
            app_state_bytes: serde_json::to_vec(&self.app_state)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::BlockParams;
    use std::io::Write;

    #[test]
    fn test_load_genesis_file() {
        // Arrange
        let doc = GenesisDoc::dev("qc-file-1", 1_700_000_000, [7; 20], 99);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&serde_json::to_vec_pretty(&doc).unwrap())
            .unwrap();

        // Act
        let loaded = GenesisDoc::load(file.path()).unwrap();

        // Assert
        assert_eq!(loaded, doc);
        let req = loaded.init_chain_request().unwrap();
        assert_eq!(req.chain_id, "qc-file-1");
        let app_state: AppGenesis = serde_json::from_slice(&req.app_state_bytes).unwrap();
        assert_eq!(app_state.bank.balances[0].coins.amount_of("uqc"), 99);
    }

    #[test]
    fn test_minimal_document_uses_defaults() {
        let doc: GenesisDoc =
            serde_json::from_str(r#"{"chain_id": "qc-min", "genesis_time": 5}"#).unwrap();

        assert!(doc.validate().is_ok());
        assert!(doc.app_state.bank.balances.is_empty());
        assert!(doc.consensus_params.is_none());
    }

    #[test]
    fn test_invalid_documents_rejected() {
        let mut doc = GenesisDoc::dev("", 0, [1; 20], 1);
        assert!(matches!(doc.validate(), Err(GenesisError::Invalid(_))));

        doc.chain_id = "qc-1".into();
        doc.consensus_params = Some(ConsensusParams {
            block: Some(BlockParams {
                max_bytes: 1024,
                max_gas: 0,
            }),
        });
        assert!(matches!(doc.validate(), Err(GenesisError::Invalid(_))));

        doc.consensus_params = None;
        doc.app_state.bank.balances[0].address = "not-hex".into();
        assert!(matches!(doc.validate(), Err(GenesisError::Invalid(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = GenesisDoc::load(dir.path().join("genesis.json"));
        assert!(matches!(result, Err(GenesisError::Io(_))));
    }
}
