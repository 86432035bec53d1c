//! # Quantum-Chain Node Runtime
//!
//! Embeds the application runtime in a runnable single-validator node.
//!
//! ## Modules
//!
//! - `config` - `QC_*` environment configuration
//! - `genesis` - genesis document loading and the dev genesis
//! - `bank` - the coin transfer module registered with the app
//! - `node` - the block driver loop
//!
//! ## Startup Sequence
//!
//! 1. Load configuration
//! 2. Open the state store and snapshot store
//! 3. Build the app with the bank module and the standard ante chain
//! 4. Run InitChain if the store is empty
//! 5. Produce blocks until ctrl-c or the configured halt

pub mod bank;
pub mod config;
pub mod genesis;
pub mod node;

use anyhow::Context as _;
use qc_app_runtime::{
    standard_ante_chain, BaseApp, BincodeTxCodec, FsSnapshotStore, QueryRouter, Router,
    Secp256k1Verifier,
};
use qc_app_store::VersionedStore;
use shared_types::{address_from_pubkey, Address};
use std::sync::Arc;
use tracing::info;

pub use config::{load_config, NodeConfig, NodeConfigError};
pub use genesis::{GenesisDoc, GenesisError};
pub use node::{NodeError, NodeHandle, SoloNode, StopReason};

/// Account credited with transaction fees.
pub fn fee_collector() -> Address {
    address_from_pubkey(b"fee_collector")
}

/// Build the app over `store` with the bank module registered.
///
/// Snapshots go to `config.snapshot_dir()` when an interval is configured.
pub fn build_app(config: &NodeConfig, store: Arc<VersionedStore>) -> anyhow::Result<BaseApp> {
    let mut router = Router::new();
    let mut queries = QueryRouter::new();
    bank::register(&mut router, &mut queries).context("Failed to register bank module")?;

    let ante = standard_ante_chain(
        config.app.ante_params(),
        fee_collector(),
        Arc::new(Secp256k1Verifier),
    );

    let mut builder = BaseApp::builder(store, Arc::new(BincodeTxCodec))
        .with_config(config.app.clone())
        .with_router(router)
        .with_query_router(queries)
        .with_ante_handler(Arc::new(ante))
        .with_init_chainer(bank::init_chainer());

    if config.app.snapshot_interval > 0 {
        let dir = config.snapshot_dir();
        let snapshots = FsSnapshotStore::new(&dir)
            .with_context(|| format!("Failed to open snapshot store at {}", dir.display()))?;
        info!("Snapshots stored under {}", dir.display());
        builder = builder.with_snapshot_store(Arc::new(snapshots));
    }

    builder.build().context("Failed to build application")
}
