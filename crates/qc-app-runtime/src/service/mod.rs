//! # BaseApp
//!
//! The application object driven by consensus. It owns the root store, the
//! two execution states and every registered callback.
//!
//! ## State Layout
//!
//! ```text
//!            root store (committed versions)
//!             │                         │
//!   view(latest) ── check branch    deliver branch (BeginBlock..Commit)
//!                     │                 │
//!              per-attempt branches  per-attempt branches
//! ```
//!
//! - The check state is rebuilt from the latest committed version after every
//!   Commit and is never merged anywhere.
//! - The deliver state exists between InitChain/BeginBlock and Commit, and is
//!   the only branch ever written into the root.

mod abci;
mod query;
mod runtx;
mod snapshot;

pub use runtx::EVENT_MESSAGE;
pub use snapshot::SnapshotManager;

use qc_app_store::{CacheStore, CommitId, CommitMultiStore, KvStore};
use shared_types::{BlockHeader, ConsensusParams, VoteInfo};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::config::{AppConfig, ConfigError};
use crate::domain::{
    AnteHandler, Context, DecCoin, QueryRouter, Router, SnapshotOutcome,
};
use crate::error::{fatal, LifecycleFault};
use crate::ports::{
    BeginBlocker, EndBlocker, InitChainer, PeerFilter, SnapshotStore, TxDecoder,
};

use self::snapshot::ActiveRestore;

/// Root-store key of the consensus parameters stashed at genesis.
pub const CONSENSUS_PARAMS_KEY: &[u8] = b"baseapp/consensus_params";

/// Where the application is in the block lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Empty store, waiting for InitChain or a snapshot.
    Uninitialized,
    /// Between blocks.
    Ready,
    /// After BeginBlock.
    InBlock,
    /// After EndBlock, waiting for Commit.
    Closing,
}

/// A context and the store branch it writes to.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Context,
    pub ms: Arc<CacheStore>,
}

pub struct BaseApp {
    name: String,
    config: AppConfig,
    min_gas_prices: Vec<DecCoin>,

    cms: Arc<dyn CommitMultiStore>,
    tx_decoder: Arc<dyn TxDecoder>,
    router: Router,
    query_router: QueryRouter,
    ante_handler: Option<Arc<dyn AnteHandler>>,

    init_chainer: Option<InitChainer>,
    begin_blocker: Option<BeginBlocker>,
    end_blocker: Option<EndBlocker>,
    addr_peer_filter: Option<PeerFilter>,
    id_peer_filter: Option<PeerFilter>,

    phase: LifecyclePhase,
    check_state: Option<AppState>,
    deliver_state: Option<AppState>,
    consensus_params: Option<ConsensusParams>,
    vote_infos: Vec<VoteInfo>,

    snapshots: SnapshotManager,
    restore: Option<ActiveRestore>,

    halt_tx: watch::Sender<bool>,
}

impl BaseApp {
    pub fn builder(
        cms: Arc<dyn CommitMultiStore>,
        tx_decoder: Arc<dyn TxDecoder>,
    ) -> BaseAppBuilder {
        BaseAppBuilder {
            cms,
            tx_decoder,
            config: AppConfig::default(),
            router: Router::new(),
            query_router: QueryRouter::new(),
            ante_handler: None,
            init_chainer: None,
            begin_blocker: None,
            end_blocker: None,
            addr_peer_filter: None,
            id_peer_filter: None,
            snapshot_store: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn last_commit_id(&self) -> CommitId {
        self.cms.last_commit_id()
    }

    pub fn last_block_height(&self) -> u64 {
        self.cms.last_commit_id().version
    }

    pub fn consensus_params(&self) -> Option<&ConsensusParams> {
        self.consensus_params.as_ref()
    }

    /// Votes of the last commit, as handed to the current block.
    pub fn vote_infos(&self) -> &[VoteInfo] {
        &self.vote_infos
    }

    /// Context of the check state.
    pub fn check_context(&self) -> &Context {
        &self.check_state().ctx
    }

    /// Context of the deliver state, if a block (or genesis) is in progress.
    pub fn deliver_context(&self) -> Option<&Context> {
        self.deliver_state.as_ref().map(|state| &state.ctx)
    }

    /// Fires `true` when the configured halt height or time is reached.
    pub fn halt_signal(&self) -> watch::Receiver<bool> {
        self.halt_tx.subscribe()
    }

    /// Outcomes of background snapshots.
    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<SnapshotOutcome> {
        self.snapshots.subscribe()
    }

    pub fn snapshot_manager(&self) -> &SnapshotManager {
        &self.snapshots
    }

    fn check_state(&self) -> &AppState {
        match &self.check_state {
            Some(state) => state,
            None => fatal(LifecycleFault::NotInitialized {
                operation: "CheckTx",
            }),
        }
    }

    fn new_context(&self, ms: Arc<CacheStore>, header: BlockHeader, is_check: bool) -> Context {
        Context::new(ms, header, is_check)
            .with_min_gas_prices(self.min_gas_prices.clone())
            .with_kv_gas_config(self.config.kv_gas)
            .with_consensus_params(self.consensus_params.clone())
    }

    /// Rebuild the check state from the latest committed version.
    fn set_check_state(&mut self, header: BlockHeader) {
        let view = self
            .cms
            .view_at(self.cms.last_commit_id().version)
            .unwrap_or_else(|e| fatal(e.into()));
        let ms = Arc::new(CacheStore::new(view));
        let ctx = self.new_context(Arc::clone(&ms), header, true);
        self.check_state = Some(AppState { ctx, ms });
    }

    /// Open a fresh deliver branch over the root store.
    fn set_deliver_state(&mut self, header: BlockHeader) {
        let root = Arc::clone(&self.cms).as_kv_store();
        let ms = Arc::new(CacheStore::new(root));
        let ctx = self.new_context(Arc::clone(&ms), header, false);
        self.deliver_state = Some(AppState { ctx, ms });
    }

    fn store_consensus_params(&self, ms: &CacheStore, params: &ConsensusParams) {
        let bytes = bincode::serialize(params).unwrap_or_else(|e| {
            fatal(LifecycleFault::Callback {
                callback: "consensus params",
                reason: e.to_string(),
            })
        });
        ms.set(CONSENSUS_PARAMS_KEY, bytes)
            .unwrap_or_else(|e| fatal(e.into()));
    }

    /// Signal the embedding node to stop; exit if nobody listens.
    fn halt(&self, height: u64, time: u64) {
        info!(
            height,
            time,
            halt_height = self.config.halt_height,
            halt_time = self.config.halt_time,
            "[app] Halting node per configuration"
        );
        if self.halt_tx.receiver_count() == 0 {
            info!("[app] No shutdown listener; exiting...");
            std::process::exit(0);
        }
        self.halt_tx.send_replace(true);
    }
}

pub struct BaseAppBuilder {
    cms: Arc<dyn CommitMultiStore>,
    tx_decoder: Arc<dyn TxDecoder>,
    config: AppConfig,
    router: Router,
    query_router: QueryRouter,
    ante_handler: Option<Arc<dyn AnteHandler>>,
    init_chainer: Option<InitChainer>,
    begin_blocker: Option<BeginBlocker>,
    end_blocker: Option<EndBlocker>,
    addr_peer_filter: Option<PeerFilter>,
    id_peer_filter: Option<PeerFilter>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
}

impl BaseAppBuilder {
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn with_query_router(mut self, query_router: QueryRouter) -> Self {
        self.query_router = query_router;
        self
    }

    pub fn with_ante_handler(mut self, handler: Arc<dyn AnteHandler>) -> Self {
        self.ante_handler = Some(handler);
        self
    }

    pub fn with_init_chainer(mut self, init_chainer: InitChainer) -> Self {
        self.init_chainer = Some(init_chainer);
        self
    }

    pub fn with_begin_blocker(mut self, begin_blocker: BeginBlocker) -> Self {
        self.begin_blocker = Some(begin_blocker);
        self
    }

    pub fn with_end_blocker(mut self, end_blocker: EndBlocker) -> Self {
        self.end_blocker = Some(end_blocker);
        self
    }

    pub fn with_addr_peer_filter(mut self, filter: PeerFilter) -> Self {
        self.addr_peer_filter = Some(filter);
        self
    }

    pub fn with_id_peer_filter(mut self, filter: PeerFilter) -> Self {
        self.id_peer_filter = Some(filter);
        self
    }

    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    /// Validate the configuration and load the latest committed state.
    pub fn build(self) -> Result<BaseApp, ConfigError> {
        self.config.validate()?;
        let min_gas_prices = self.config.parsed_min_gas_prices()?;

        let last = self.cms.last_commit_id();
        let consensus_params = match self.cms.get(CONSENSUS_PARAMS_KEY) {
            Ok(Some(bytes)) => match bincode::deserialize(&bytes) {
                Ok(params) => Some(params),
                Err(e) => {
                    warn!("[app] Ignoring unreadable consensus params: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => return Err(ConfigError::Invalid(format!("cannot read store: {e}"))),
        };

        if self.config.snapshot_interval > 0 && self.snapshot_store.is_none() {
            warn!(
                interval = self.config.snapshot_interval,
                "[app] Snapshot interval set without a snapshot store; snapshots disabled"
            );
        }
        let snapshots = SnapshotManager::new(
            self.snapshot_store,
            Arc::clone(&self.cms).as_snapshotter(),
            self.config.snapshot_interval,
            self.config.snapshot_keep_recent,
        );

        let (halt_tx, _) = watch::channel(false);
        let phase = if last.version > 0 {
            LifecyclePhase::Ready
        } else {
            LifecyclePhase::Uninitialized
        };

        let mut app = BaseApp {
            name: self.config.app_name.clone(),
            config: self.config,
            min_gas_prices,
            cms: self.cms,
            tx_decoder: self.tx_decoder,
            router: self.router,
            query_router: self.query_router,
            ante_handler: self.ante_handler,
            init_chainer: self.init_chainer,
            begin_blocker: self.begin_blocker,
            end_blocker: self.end_blocker,
            addr_peer_filter: self.addr_peer_filter,
            id_peer_filter: self.id_peer_filter,
            phase,
            check_state: None,
            deliver_state: None,
            consensus_params,
            vote_infos: Vec::new(),
            snapshots,
            restore: None,
            halt_tx,
        };
        app.set_check_state(BlockHeader {
            height: last.version,
            ..Default::default()
        });

        info!(
            name = %app.name,
            height = last.version,
            hash = %last.hash_hex(),
            "[app] Application loaded"
        );
        Ok(app)
    }
}
