//! Passphrase to key derivation.
//!
//! Encrypted stores persist a [`KeyDerivation`] descriptor at the store root so
//! the same passphrase always re-derives the same key. Two strategies exist:
//!
//! - **Argon2id**: memory-hard KDF with a random per-store salt. Used for every
//!   new store unless configured otherwise.
//! - **LegacyPad**: passphrase bytes zero-padded or truncated to 32 bytes. Offers
//!   no resistance to brute force; it exists only to read stores written without
//!   a descriptor.
//!
//! The descriptor format is tagged by algorithm, so further strategies can be
//! added without breaking existing stores.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use argon2::Argon2;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::fsutil;
use crate::{CasError, Result};

/// Length of a derived key in bytes (AES-256).
pub const KEY_LENGTH: usize = 32;

/// Length of the random Argon2id salt in bytes.
pub const SALT_LENGTH: usize = 16;

/// File name of the key descriptor at the store root.
pub const DESCRIPTOR_FILE: &str = ".shardblob-kdf.json";

/// Symmetric key for the transform pipeline.
///
/// Key material is zeroized when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct StoreKey {
    key: [u8; KEY_LENGTH],
}

impl StoreKey {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Raw key bytes. Avoid storing or logging this value.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Strategy used when a new encrypted store is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KdfAlgorithm {
    #[default]
    Argon2id,
    LegacyPad,
}

/// Parameters for creating a fresh [`KeyDerivation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,
    /// Argon2 memory cost in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// 64 MiB, 3 iterations, single lane.
    fn default() -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// Persisted description of how a store's key is derived from its passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum KeyDerivation {
    Argon2id {
        /// Hex-encoded salt.
        salt: String,
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    },
    LegacyPad,
}

impl KeyDerivation {
    /// Build a new descriptor, drawing a fresh salt where the algorithm needs one.
    pub fn generate(params: &KdfParams) -> Result<Self> {
        match params.algorithm {
            KdfAlgorithm::Argon2id => {
                let mut salt = [0u8; SALT_LENGTH];
                getrandom::getrandom(&mut salt).map_err(|e| {
                    CasError::KeyDerivation(format!("Failed to generate salt: {}", e))
                })?;
                Ok(KeyDerivation::Argon2id {
                    salt: hex::encode(salt),
                    memory_kib: params.memory_kib,
                    iterations: params.iterations,
                    parallelism: params.parallelism,
                })
            }
            KdfAlgorithm::LegacyPad => Ok(KeyDerivation::LegacyPad),
        }
    }

    pub fn algorithm(&self) -> KdfAlgorithm {
        match self {
            KeyDerivation::Argon2id { .. } => KdfAlgorithm::Argon2id,
            KeyDerivation::LegacyPad => KdfAlgorithm::LegacyPad,
        }
    }

    /// Derive the store key from a passphrase.
    ///
    /// Deterministic for a given descriptor. Does not, and cannot, tell whether
    /// the passphrase is the one the store was created with.
    pub fn derive(&self, passphrase: &str) -> Result<StoreKey> {
        if passphrase.is_empty() {
            return Err(CasError::KeyDerivation(
                "Passphrase cannot be empty".to_string(),
            ));
        }

        match self {
            KeyDerivation::Argon2id {
                salt,
                memory_kib,
                iterations,
                parallelism,
            } => {
                let salt = hex::decode(salt)
                    .map_err(|e| CasError::CorruptData(format!("Invalid KDF salt: {}", e)))?;

                let params =
                    argon2::Params::new(*memory_kib, *iterations, *parallelism, Some(KEY_LENGTH))
                        .map_err(|e| {
                            CasError::KeyDerivation(format!(
                                "Failed to create Argon2 params: {}",
                                e
                            ))
                        })?;
                let argon2 =
                    Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

                let mut key_bytes = [0u8; KEY_LENGTH];
                argon2
                    .hash_password_into(passphrase.as_bytes(), &salt, &mut key_bytes)
                    .map_err(|e| CasError::KeyDerivation(format!("Key derivation failed: {}", e)))?;
                Ok(StoreKey::from_bytes(key_bytes))
            }
            KeyDerivation::LegacyPad => {
                let mut key_bytes = [0u8; KEY_LENGTH];
                let bytes = passphrase.as_bytes();
                let n = bytes.len().min(KEY_LENGTH);
                key_bytes[..n].copy_from_slice(&bytes[..n]);
                Ok(StoreKey::from_bytes(key_bytes))
            }
        }
    }

    /// Path of the descriptor file under `root`.
    pub fn descriptor_path(root: &Path) -> PathBuf {
        root.join(DESCRIPTOR_FILE)
    }

    /// Read the descriptor stored under `root`, if any.
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(Self::descriptor_path(root)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CasError::CorruptData(format!("Invalid key descriptor: {}", e)))
    }

    /// Write the descriptor under `root` atomically.
    pub fn persist(&self, root: &Path, sync: bool) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| CasError::KeyDerivation(format!("Failed to encode descriptor: {}", e)))?;
        fsutil::write_atomic(&Self::descriptor_path(root), &json, sync)?;
        Ok(())
    }
}
