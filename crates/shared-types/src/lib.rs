//! # Shared Types Crate
//!
//! Types exchanged between the consensus engine, the application runtime and
//! the business modules.
//!
//! ## Design Principles
//!
//! - **Opaque pass-through**: validator updates and vote info are carried, not
//!   interpreted. The runtime only sorts and compares them.
//! - **Deterministic ordering**: everything that ends up in a response or an
//!   event log has a total order so every validator emits identical bytes.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
