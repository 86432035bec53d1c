//! # qc-app-store
//!
//! Versioned Store Adapter for the Quantum-Chain application runtime.
//!
//! ## Role in System
//!
//! - **Root store**: `VersionedStore` keeps every committed version of every
//!   key and produces a merkle commitment per version.
//! - **Branches**: `CacheStore` is a copy-on-write overlay. Writes stay in the
//!   overlay until `write()` merges them into the parent.
//! - **State sync**: committed versions can be exported as checksummed chunks
//!   and imported into an empty store.
//!
//! ## Branch Layout
//!
//! ```text
//!   VersionedStore (root, committed versions + working set)
//!        │
//!        ├── CacheStore (deliver branch) ── CacheStore (per-tx branch)
//!        │
//!        └── VersionView(latest) ── CacheStore (check branch)
//! ```
//!
//! Only the deliver branch is ever written into the root, and only at
//! Commit.

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::*;
pub use domain::*;
pub use ports::*;
