//! secp256k1 ECDSA verification via `k256`.
//!
//! Keys are compressed or uncompressed SEC1 points, signatures are 64-byte
//! `r || s` over SHA-256 of the message. High-S signatures are rejected to
//! prevent malleability.

use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};

use crate::ports::SignatureVerifier;

#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Verifier;

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(&self, pub_key: &[u8], msg: &[u8], signature: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_sec1_bytes(pub_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        if signature.normalize_s().is_some() {
            return false;
        }
        key.verify(msg, &signature).is_ok()
    }
}
