//! Keyring error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyringError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Key with address {0} not found")]
    AddressNotFound(String),

    #[error("Cannot overwrite key: {0}")]
    AlreadyExists(String),

    #[error("Private key not available")]
    PrivateKeyUnavailable,

    #[error("Cannot sign with offline keys")]
    OfflineKey,

    #[error("Only works on local private keys")]
    NotLocal,

    #[error("No signing device connected")]
    NoDevice,

    #[error("Signing device error: {0}")]
    Device(String),

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}
