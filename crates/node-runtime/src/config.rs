//! # Node Configuration
//!
//! Defaults overridden from `QC_*` environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `QC_CHAIN_ID` | `chain_id` |
//! | `QC_DATA_DIR` | `data_dir` |
//! | `QC_BLOCK_INTERVAL_MS` | `block_interval` |
//! | `QC_GENESIS_FILE` | `genesis_path` |
//!
//! Runtime settings (`QC_HALT_HEIGHT`, `QC_SNAPSHOT_INTERVAL`, ...) are read
//! by `AppConfig::from_env`.

use qc_app_runtime::{AppConfig, ConfigError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NodeConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error(transparent)]
    App(#[from] ConfigError),
}

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Chain id used when no genesis file is given.
    pub chain_id: String,
    /// Root of on-disk data (snapshots).
    pub data_dir: PathBuf,
    /// Time between produced blocks.
    pub block_interval: Duration,
    /// Genesis JSON. `None` starts a single-account dev chain.
    pub genesis_path: Option<PathBuf>,
    pub app: AppConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain_id: "quantum-chain-dev".to_string(),
            data_dir: PathBuf::from("./data"),
            block_interval: Duration::from_millis(1000),
            genesis_path: None,
            app: AppConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }
}

/// Load configuration from the environment.
pub fn load_config() -> Result<NodeConfig, NodeConfigError> {
    let mut config = NodeConfig {
        app: AppConfig::from_env()?,
        ..NodeConfig::default()
    };

    if let Ok(chain_id) = std::env::var("QC_CHAIN_ID") {
        config.chain_id = chain_id;
    }
    if let Ok(dir) = std::env::var("QC_DATA_DIR") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Ok(value) = std::env::var("QC_BLOCK_INTERVAL_MS") {
        let millis: u64 = value
            .trim()
            .parse()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or(NodeConfigError::InvalidValue {
                var: "QC_BLOCK_INTERVAL_MS",
                value,
            })?;
        config.block_interval = Duration::from_millis(millis);
    }
    if let Ok(path) = std::env::var("QC_GENESIS_FILE") {
        info!("Using genesis file {}", path);
        config.genesis_path = Some(PathBuf::from(path));
    }

    Ok(config)
}
