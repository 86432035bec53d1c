//! # Keyring
//!
//! In-memory key store indexed by name and by address.
//!
//! ## Capabilities
//!
//! | Kind | sign | export private key |
//! |------|------|--------------------|
//! | Local | yes | yes |
//! | Ledger | through the `DeviceSigner`, if one is attached | no |
//! | Offline | no | no |
//! | Multi | no | no |

use parking_lot::RwLock;
use shared_types::{format_address, Address};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::KeyringError;
use crate::key::{compress_public_key, KeyInfo, KeyKind, Secp256k1Key};

/// Signs on behalf of a named key.
pub trait Signer: Send + Sync {
    /// Returns `(signature, public key)`.
    fn sign(&self, name: &str, msg: &[u8]) -> Result<(Vec<u8>, Vec<u8>), KeyringError>;

    fn sign_by_address(
        &self,
        address: &Address,
        msg: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), KeyringError>;
}

/// External hardware signer holding ledger keys.
pub trait DeviceSigner: Send + Sync {
    /// Compressed public key at `account/index`.
    fn public_key(&self, account: u32, index: u32) -> Result<Vec<u8>, KeyringError>;

    /// Sign `msg` with the key whose public key is `pub_key`.
    fn sign(&self, pub_key: &[u8], msg: &[u8]) -> Result<Vec<u8>, KeyringError>;
}

struct Entry {
    info: KeyInfo,
    secret: Option<Secp256k1Key>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    by_address: HashMap<Address, String>,
}

impl Inner {
    fn get(&self, name: &str) -> Result<&Entry, KeyringError> {
        self.entries
            .get(name)
            .ok_or_else(|| KeyringError::KeyNotFound(name.to_string()))
    }

    fn name_of(&self, address: &Address) -> Result<String, KeyringError> {
        self.by_address
            .get(address)
            .cloned()
            .ok_or_else(|| KeyringError::AddressNotFound(format_address(address)))
    }

    fn insert(&mut self, info: KeyInfo, secret: Option<Secp256k1Key>) -> KeyInfo {
        if let Some(old) = self.entries.remove(&info.name) {
            self.by_address.remove(&old.info.address);
        }
        self.by_address.insert(info.address, info.name.clone());
        self.entries.insert(
            info.name.clone(),
            Entry {
                info: info.clone(),
                secret,
            },
        );
        info
    }
}

#[derive(Default)]
pub struct Keyring {
    inner: RwLock<Inner>,
    device: Option<Arc<dyn DeviceSigner>>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyring that can create and sign with ledger keys.
    pub fn with_device(device: Arc<dyn DeviceSigner>) -> Self {
        Self {
            inner: RwLock::default(),
            device: Some(device),
        }
    }

    /// Generate and store a new local key.
    pub fn generate(&self, name: &str) -> Result<KeyInfo, KeyringError> {
        let mut inner = self.inner.write();
        if inner.entries.contains_key(name) {
            return Err(KeyringError::AlreadyExists(name.to_string()));
        }
        let secret = Secp256k1Key::generate();
        let info = KeyInfo::new(name, KeyKind::Local, secret.public_key());
        info!(name, address = %info.address_string(), "[keyring] Generated key");
        Ok(inner.insert(info, Some(secret)))
    }

    pub fn key(&self, name: &str) -> Result<KeyInfo, KeyringError> {
        Ok(self.inner.read().get(name)?.info.clone())
    }

    pub fn key_by_address(&self, address: &Address) -> Result<KeyInfo, KeyringError> {
        let inner = self.inner.read();
        let name = inner.name_of(address)?;
        Ok(inner.get(&name)?.info.clone())
    }

    /// All keys, ordered by name.
    pub fn list(&self) -> Vec<KeyInfo> {
        self.inner
            .read()
            .entries
            .values()
            .map(|entry| entry.info.clone())
            .collect()
    }

    pub fn delete(&self, name: &str) -> Result<(), KeyringError> {
        let mut inner = self.inner.write();
        let entry = inner
            .entries
            .remove(name)
            .ok_or_else(|| KeyringError::KeyNotFound(name.to_string()))?;
        inner.by_address.remove(&entry.info.address);
        debug!(name, "[keyring] Deleted key");
        Ok(())
    }

    pub fn delete_by_address(&self, address: &Address) -> Result<(), KeyringError> {
        let name = self.inner.read().name_of(address)?;
        self.delete(&name)
    }

    /// Import a hex-encoded private key as a local key.
    pub fn import_private_key(&self, name: &str, hex_key: &str) -> Result<KeyInfo, KeyringError> {
        let mut inner = self.inner.write();
        if inner.entries.contains_key(name) {
            return Err(KeyringError::AlreadyExists(name.to_string()));
        }
        let bytes = hex::decode(hex_key.trim()).map_err(|e| KeyringError::InvalidHex(e.to_string()))?;
        let secret = Secp256k1Key::from_bytes(&bytes)?;
        let info = KeyInfo::new(name, KeyKind::Local, secret.public_key());
        Ok(inner.insert(info, Some(secret)))
    }

    /// Hex-encoded private key of a local key.
    pub fn export_private_key(&self, name: &str) -> Result<String, KeyringError> {
        let inner = self.inner.read();
        let entry = inner.get(name)?;
        if entry.info.kind != KeyKind::Local {
            return Err(KeyringError::NotLocal);
        }
        let secret = entry
            .secret
            .as_ref()
            .ok_or(KeyringError::PrivateKeyUnavailable)?;
        Ok(hex::encode(secret.to_bytes()))
    }

    pub fn export_private_key_by_address(&self, address: &Address) -> Result<String, KeyringError> {
        let name = self.inner.read().name_of(address)?;
        self.export_private_key(&name)
    }

    /// Import a hex-encoded public key as an offline key.
    ///
    /// An existing entry is only replaced if it carries no public key.
    pub fn import_public_key(&self, name: &str, hex_key: &str) -> Result<KeyInfo, KeyringError> {
        if let Ok(existing) = self.key(name) {
            if !existing.pub_key.is_empty() {
                return Err(KeyringError::AlreadyExists(name.to_string()));
            }
        }
        let bytes = hex::decode(hex_key.trim()).map_err(|e| KeyringError::InvalidHex(e.to_string()))?;
        self.save_offline_key(name, &bytes)
    }

    pub fn export_public_key(&self, name: &str) -> Result<String, KeyringError> {
        Ok(hex::encode(self.key(name)?.pub_key))
    }

    pub fn export_public_key_by_address(&self, address: &Address) -> Result<String, KeyringError> {
        Ok(hex::encode(self.key_by_address(address)?.pub_key))
    }

    /// Store a public key that can verify but not sign.
    pub fn save_offline_key(&self, name: &str, pub_key: &[u8]) -> Result<KeyInfo, KeyringError> {
        let pub_key = compress_public_key(pub_key)?;
        let info = KeyInfo::new(name, KeyKind::Offline, pub_key);
        Ok(self.inner.write().insert(info, None))
    }

    /// Store a multisig public key. Its bytes are opaque to the keyring.
    pub fn save_multisig(&self, name: &str, pub_key: &[u8]) -> Result<KeyInfo, KeyringError> {
        if pub_key.is_empty() {
            return Err(KeyringError::InvalidPublicKey);
        }
        let info = KeyInfo::new(name, KeyKind::Multi, pub_key.to_vec());
        Ok(self.inner.write().insert(info, None))
    }

    /// Register the device key at `account/index`.
    pub fn save_ledger_key(
        &self,
        name: &str,
        account: u32,
        index: u32,
    ) -> Result<KeyInfo, KeyringError> {
        let device = self.device.as_ref().ok_or(KeyringError::NoDevice)?;
        let pub_key = compress_public_key(&device.public_key(account, index)?)?;
        let info = KeyInfo::new(name, KeyKind::Ledger, pub_key);
        Ok(self.inner.write().insert(info, None))
    }
}

impl Signer for Keyring {
    fn sign(&self, name: &str, msg: &[u8]) -> Result<(Vec<u8>, Vec<u8>), KeyringError> {
        let inner = self.inner.read();
        let entry = inner.get(name)?;
        match entry.info.kind {
            KeyKind::Local => {
                let secret = entry
                    .secret
                    .as_ref()
                    .ok_or(KeyringError::PrivateKeyUnavailable)?;
                Ok((secret.sign(msg), entry.info.pub_key.clone()))
            }
            KeyKind::Ledger => {
                let device = self.device.as_ref().ok_or(KeyringError::NoDevice)?;
                let signature = device.sign(&entry.info.pub_key, msg)?;
                Ok((signature, entry.info.pub_key.clone()))
            }
            KeyKind::Offline | KeyKind::Multi => Err(KeyringError::OfflineKey),
        }
    }

    fn sign_by_address(
        &self,
        address: &Address,
        msg: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), KeyringError> {
        let name = self.inner.read().name_of(address)?;
        self.sign(&name, msg)
    }
}
