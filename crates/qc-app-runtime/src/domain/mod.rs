//! Domain layer: execution primitives with no knowledge of the consensus
//! transport or of how snapshots are persisted.

pub mod abci;
pub mod ante;
pub mod auth;
pub mod context;
pub mod entities;
pub mod gas;
pub mod restorer;
pub mod router;
pub mod snapshot;

pub use abci::*;
pub use ante::{AnteChain, AnteHandler, AnteParams, AnteStage};
pub use context::*;
pub use entities::*;
pub use gas::*;
pub use restorer::*;
pub use router::*;
pub use snapshot::*;
