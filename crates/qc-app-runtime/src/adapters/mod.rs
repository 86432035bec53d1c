//! Adapters implementing the outbound ports.

pub mod codec;
pub mod secp256k1;
pub mod snapshot_store;

pub use codec::*;
pub use secp256k1::*;
pub use snapshot_store::*;
