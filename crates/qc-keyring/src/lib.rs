//! # Keyring
//!
//! secp256k1 key management for signing Quantum-Chain transactions.
//!
//! - Local keys sign in-process.
//! - Ledger keys sign through an attached `DeviceSigner`.
//! - Offline and multisig keys are public only and refuse to sign.
//!
//! Addresses are derived from the compressed public key the same way the
//! runtime derives them (`shared_types::address_from_pubkey`), and
//! signatures are 64-byte low-S `r || s` over SHA-256 of the sign bytes.
//!
//! ## Usage
//!
//! ```
//! use qc_keyring::{Keyring, Signer};
//!
//! let keyring = Keyring::new();
//! let alice = keyring.generate("alice").unwrap();
//! let (signature, pub_key) = keyring.sign("alice", b"sign bytes").unwrap();
//! assert_eq!(pub_key, alice.pub_key);
//! assert_eq!(signature.len(), 64);
//! ```

pub mod errors;
pub mod key;
pub mod keyring;

pub use errors::KeyringError;
pub use key::{compress_public_key, KeyInfo, KeyKind, Secp256k1Key};
pub use keyring::{DeviceSigner, Keyring, Signer};
