//! Configuration for the application runtime.
//!
//! Defaults are usable as-is; `from_env` overrides them from `QC_*`
//! variables the same way the node runtime loads its own settings.

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use qc_app_store::DEFAULT_CHUNK_SIZE;

use crate::domain::{parse_dec_coins, AnteParams, DecCoin, KvGasConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Reported by `Info`.
    pub app_name: String,
    /// Reported by `Info` and `app/version`.
    pub app_version: String,

    /// Local mempool price per gas unit, e.g. `"0.025uqc"`. Empty disables
    /// the check.
    pub min_gas_prices: String,

    /// Halt after committing this height (0 = disabled).
    pub halt_height: u64,
    /// Halt after committing a block at or past this unix time (0 = disabled).
    pub halt_time: u64,

    /// Maximum encoded transaction size in bytes (0 = unlimited).
    pub max_tx_bytes: usize,

    /// Take a snapshot every N heights (0 = disabled).
    pub snapshot_interval: u64,
    /// Snapshots to keep after pruning (0 = keep all).
    pub snapshot_keep_recent: u32,
    /// Bytes per exported snapshot chunk.
    pub snapshot_chunk_size: usize,

    pub kv_gas: KvGasConfig,
    pub max_memo_characters: usize,
    pub tx_size_cost_per_byte: u64,
    pub sig_verify_cost_secp256k1: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let ante = AnteParams::default();
        Self {
            app_name: "quantum-chain".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            min_gas_prices: String::new(),
            halt_height: 0,
            halt_time: 0,
            max_tx_bytes: 0,
            snapshot_interval: 0,
            snapshot_keep_recent: 2,
            snapshot_chunk_size: DEFAULT_CHUNK_SIZE,
            kv_gas: KvGasConfig::default(),
            max_memo_characters: ante.max_memo_characters,
            tx_size_cost_per_byte: ante.tx_size_cost_per_byte,
            sig_verify_cost_secp256k1: ante.sig_verify_cost_secp256k1,
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                var,
                value,
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Defaults overridden by `QC_HALT_HEIGHT`, `QC_HALT_TIME`,
    /// `QC_MIN_GAS_PRICES`, `QC_SNAPSHOT_INTERVAL`, `QC_SNAPSHOT_KEEP_RECENT`,
    /// `QC_SNAPSHOT_CHUNK_SIZE` and `QC_MAX_TX_BYTES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(height) = env_parse("QC_HALT_HEIGHT")? {
            config.halt_height = height;
        }
        if let Some(time) = env_parse("QC_HALT_TIME")? {
            config.halt_time = time;
        }
        if let Ok(prices) = std::env::var("QC_MIN_GAS_PRICES") {
            config.min_gas_prices = prices;
        }
        if let Some(interval) = env_parse("QC_SNAPSHOT_INTERVAL")? {
            config.snapshot_interval = interval;
        }
        if let Some(keep) = env_parse("QC_SNAPSHOT_KEEP_RECENT")? {
            config.snapshot_keep_recent = keep;
        }
        if let Some(size) = env_parse("QC_SNAPSHOT_CHUNK_SIZE")? {
            config.snapshot_chunk_size = size;
        }
        if let Some(max) = env_parse("QC_MAX_TX_BYTES")? {
            config.max_tx_bytes = max;
        }

        config.validate()?;
        if config.halt_height > 0 || config.halt_time > 0 {
            info!(
                "[app] Halt configured: height={} time={}",
                config.halt_height, config.halt_time
            );
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_min_gas_prices()?;
        if self.app_name.is_empty() {
            return Err(ConfigError::Invalid("app_name must not be empty".into()));
        }
        if self.snapshot_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "snapshot_chunk_size must be positive".into(),
            ));
        }
        if self.sig_verify_cost_secp256k1 == 0 {
            return Err(ConfigError::Invalid(
                "sig_verify_cost_secp256k1 must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn parsed_min_gas_prices(&self) -> Result<Vec<DecCoin>, ConfigError> {
        parse_dec_coins(&self.min_gas_prices).map_err(|e| ConfigError::InvalidValue {
            var: "min_gas_prices",
            value: self.min_gas_prices.clone(),
            reason: e.to_string(),
        })
    }

    pub fn ante_params(&self) -> AnteParams {
        AnteParams {
            max_memo_characters: self.max_memo_characters,
            tx_size_cost_per_byte: self.tx_size_cost_per_byte,
            sig_verify_cost_secp256k1: self.sig_verify_cost_secp256k1,
        }
    }
}
