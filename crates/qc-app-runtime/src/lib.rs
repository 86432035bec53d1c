//! # Application Runtime
//!
//! Executes transactions and drives the block lifecycle on behalf of a
//! consensus engine, on top of a versioned key/value store.
//!
//! ## Purpose
//!
//! - Runs every transaction through one engine (`run_tx`) in four modes:
//!   Check, ReCheck, Simulate and Deliver.
//! - Meters gas per transaction and per block, and recovers handler panics.
//! - Dispatches messages to business modules through a router and an ante
//!   pipeline of independently configured stages.
//! - Serves path-based queries and coordinates state-sync snapshots.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | Failed messages leave no trace in state | `service/runtx.rs` - message branch dropped |
//! | Ante writes survive message failure | `service/runtx.rs` - ante branch written first |
//! | Gas used never exceeds the limit | `domain/gas.rs` - saturating meter |
//! | Only the deliver branch reaches the root | `service/abci.rs` - `commit()` |
//! | Out-of-order lifecycle calls abort | `error.rs` - `fatal()` |
//! | One snapshot in flight | `service/snapshot.rs` - `SnapshotManager::trigger()` |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/ - bincode codec, secp256k1 verifier, snapshot stores │
//! │  service/  - BaseApp: lifecycle, run_tx, queries, snapshots     │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - Application trait                          │
//! │  ports/outbound.rs - TxDecoder, SignatureVerifier, SnapshotStore│
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/gas.rs      - GasMeter, KvGasConfig                     │
//! │  domain/context.rs  - Context, EventManager, GasKvStore         │
//! │  domain/ante/       - ante stages and the standard chain        │
//! │  domain/router.rs   - message and query routers                 │
//! │  domain/restorer.rs - sequential snapshot import                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let store = Arc::new(VersionedStore::new());
//! let mut app = BaseApp::builder(store, Arc::new(BincodeTxCodec))
//!     .with_router(router)
//!     .with_ante_handler(Arc::new(standard_ante_chain(params, collector, verifier)))
//!     .build()?;
//!
//! app.init_chain(RequestInitChain { chain_id: "qc-1".into(), ..Default::default() });
//! app.begin_block(RequestBeginBlock { header, ..Default::default() });
//! let res = app.deliver_tx(RequestDeliverTx { tx: tx_bytes });
//! app.end_block(RequestEndBlock { height: 1 });
//! let commit = app.commit();
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::{BincodeTxCodec, FsSnapshotStore, InMemorySnapshotStore, Secp256k1Verifier};
pub use config::{AppConfig, ConfigError};
pub use domain::ante::standard_ante_chain;
pub use domain::*;
pub use error::{fatal, LifecycleFault, Result, TxError};
pub use ports::*;
pub use service::{
    AppState, BaseApp, BaseAppBuilder, LifecyclePhase, SnapshotManager, CONSENSUS_PARAMS_KEY,
    EVENT_MESSAGE,
};
