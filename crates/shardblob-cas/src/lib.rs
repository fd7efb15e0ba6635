//! # shardblob-cas
//!
//! Local content-addressable blob store.
//!
//! Every payload is addressed by the SHA-256 of its plaintext, stored once no
//! matter how often it is submitted, gzip-compressed and (optionally)
//! AES-256-GCM encrypted. A JSON sidecar next to each object carries its
//! descriptive metadata.
//!
//! ## Directory Layout
//!
//! ```text
//! <root>/
//! ├── .shardblob-kdf.json              # key descriptor (encrypted stores only)
//! └── ba/
//!     └── 781/
//!         └── 6bf/
//!             ├── 8f01cfea...15ad.blob       # sealed object bytes
//!             └── 8f01cfea...15ad.blob.meta  # metadata sidecar
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! put: plaintext -> sha256 id -> gzip -> aes-256-gcm -> <shard>/<rest>.blob
//! get: <shard>/<rest>.blob -> aes-256-gcm open -> gunzip -> plaintext
//! ```

mod fsutil;
pub mod id;
pub mod key;
pub mod layout;
pub mod observer;
pub mod sidecar;
pub mod store;
pub mod transform;
pub mod traverse;

pub use id::{identify, BlobId};
pub use key::{KdfAlgorithm, KdfParams, KeyDerivation, StoreKey};
pub use layout::{shard, OBJECT_EXTENSION, SIDECAR_SUFFIX};
pub use observer::{ObserverError, ObserverResult, StoreObserver};
pub use sidecar::BlobMeta;
pub use store::{BlobStore, StoreOptions, StoreSettings};
pub use traverse::{sort_for_display, DirObservation, StoreStats, Walk};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum CasError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("store root is not a directory: {path:?}")]
    InvalidRoot { path: PathBuf },

    #[error("Blob not found: {id}")]
    NotFound { id: String },

    #[error("Corrupt data: {0}")]
    CorruptData(String),

    #[error("Authentication failed: wrong key or tampered ciphertext")]
    AuthenticationFailure,

    #[error("Invalid blob id: {0:?}")]
    InvalidId(String),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),
}

impl CasError {
    /// True for the "requested id is absent" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CasError::NotFound { .. })
    }

    /// True when decryption failed its integrity check, typically a wrong passphrase.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, CasError::AuthenticationFailure)
    }
}

pub type Result<T> = std::result::Result<T, CasError>;
