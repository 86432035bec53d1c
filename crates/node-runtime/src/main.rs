//! # Quantum-Chain Node
//!
//! Single-validator node entry point. See the library crate for the startup
//! sequence.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use qc_app_runtime::{Application, LifecyclePhase};
use qc_app_store::VersionedStore;
use qc_keyring::Keyring;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use node_runtime::{build_app, load_config, GenesisDoc, SoloNode, StopReason};

/// Balance of the generated dev faucet account.
const DEV_FAUCET_AMOUNT: u128 = 1_000_000_000_000;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("QC_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config().context("Invalid configuration")?;

    info!("===========================================");
    info!("  Quantum-Chain Node v{}", config.app.app_version);
    info!("===========================================");

    let store = Arc::new(VersionedStore::with_chunk_size(config.app.snapshot_chunk_size));
    let mut app = build_app(&config, store)?;

    let chain_id = if app.phase() == LifecyclePhase::Uninitialized {
        let genesis = match &config.genesis_path {
            Some(path) => GenesisDoc::load(path)
                .with_context(|| format!("Failed to load genesis from {}", path.display()))?,
            None => dev_genesis(&config.chain_id)?,
        };
        let req = genesis.init_chain_request()?;
        let res = app.init_chain(req);
        info!(
            chain_id = %genesis.chain_id,
            validators = res.validators.len(),
            "Chain initialized from genesis"
        );
        genesis.chain_id
    } else {
        info!(height = app.last_block_height(), "Resuming from committed state");
        config.chain_id.clone()
    };

    let (node, _handle) = SoloNode::new(app, chain_id, config.block_interval);
    info!("Data Dir: {:?}", config.data_dir);
    info!("Node is running. Press Ctrl+C to stop.");

    let (app, reason) = node.run().await?;
    match reason {
        StopReason::Halted => warn!(height = app.last_block_height(), "Node halted"),
        StopReason::Interrupted => info!(height = app.last_block_height(), "Shutdown complete"),
    }
    Ok(())
}

/// Genesis with one freshly generated faucet key.
fn dev_genesis(chain_id: &str) -> Result<GenesisDoc> {
    let keyring = Keyring::new();
    let faucet = keyring.generate("faucet")?;
    let genesis_time = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    warn!(
        address = %faucet.address_string(),
        "No genesis file configured; funding a throwaway dev faucet"
    );
    Ok(GenesisDoc::dev(
        chain_id,
        genesis_time,
        faucet.address,
        DEV_FAUCET_AMOUNT,
    ))
}
