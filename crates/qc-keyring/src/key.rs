//! # Keys
//!
//! - `Secp256k1Key`: a local private key. Signs SHA-256 digests with RFC 6979
//!   nonces and low-S normalization; secret bytes are zeroized on drop.
//! - `KeyInfo`: the public record of a stored key of any kind.

use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use shared_types::{address_from_pubkey, format_address, Address};
use zeroize::Zeroize;

use crate::errors::KeyringError;

/// What a stored key can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    /// Private key held in the keyring.
    Local,
    /// Private key held by an external device.
    Ledger,
    /// Public key only.
    Offline,
    /// Multisig public key.
    Multi,
}

/// Public record of a stored key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub name: String,
    pub kind: KeyKind,
    /// Compressed SEC1 public key (or multisig key bytes).
    pub pub_key: Vec<u8>,
    pub address: Address,
}

impl KeyInfo {
    pub fn new(name: impl Into<String>, kind: KeyKind, pub_key: Vec<u8>) -> Self {
        let address = address_from_pubkey(&pub_key);
        Self {
            name: name.into(),
            kind,
            pub_key,
            address,
        }
    }

    pub fn address_string(&self) -> String {
        format_address(&self.address)
    }
}

/// Validate a SEC1 public key and return it compressed.
pub fn compress_public_key(pub_key: &[u8]) -> Result<Vec<u8>, KeyringError> {
    let key = VerifyingKey::from_sec1_bytes(pub_key).map_err(|_| KeyringError::InvalidPublicKey)?;
    Ok(key.to_encoded_point(true).as_bytes().to_vec())
}

/// A local secp256k1 private key.
pub struct Secp256k1Key {
    signing_key: SigningKey,
}

impl Secp256k1Key {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyringError> {
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| KeyringError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Compressed SEC1 public key (33 bytes).
    pub fn public_key(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    pub fn address(&self) -> Address {
        address_from_pubkey(&self.public_key())
    }

    /// 64-byte `r || s` signature over SHA-256 of `message`.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(message);
        let signature = signature.normalize_s().unwrap_or(signature);
        signature.to_bytes().to_vec()
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }
}

impl Clone for Secp256k1Key {
    fn clone(&self) -> Self {
        Self {
            signing_key: self.signing_key.clone(),
        }
    }
}

impl Drop for Secp256k1Key {
    fn drop(&mut self) {
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        bytes.zeroize();
    }
}
