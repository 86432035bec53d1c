//! # Error Types
//!
//! Errors for the primitive types shared across crates.

use thiserror::Error;

/// Errors parsing an account address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Input was not valid hex.
    #[error("Invalid hex address: {0}")]
    InvalidHex(String),

    /// Decoded address had the wrong length.
    #[error("Invalid address length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
