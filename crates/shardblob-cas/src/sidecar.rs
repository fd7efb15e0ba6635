//! Metadata sidecar store.
//!
//! Each object `<rest>.blob` has a pretty-printed JSON record at
//! `<rest>.blob.meta`. Keys use the established on-disk names (`Name`, `URI`,
//! `Length`, `BlobHash`, `IngestionTime`, `Owner`); snake_case keys are also
//! accepted when reading.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fsutil;
use crate::id::BlobId;
use crate::{CasError, Result};

/// Descriptive metadata stored alongside an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMeta {
    /// Original name as ingested
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,

    /// Location URI (scheme + full path)
    #[serde(rename = "URI", alias = "uri", default)]
    pub uri: String,

    /// Plaintext length in bytes (set by the store)
    #[serde(rename = "Length", alias = "length")]
    pub length: u64,

    /// Content hash, equal to the blob id (set by the store)
    #[serde(rename = "BlobHash", alias = "blob_hash", alias = "content_hash")]
    pub blob_hash: String,

    /// Time of ingestion, UTC
    #[serde(rename = "IngestionTime", alias = "ingestion_time")]
    pub ingestion_time: DateTime<Utc>,

    /// Optional owner identifier, empty when unset
    #[serde(rename = "Owner", alias = "owner", default)]
    pub owner: String,
}

impl BlobMeta {
    /// Metadata for a new payload, ingested now.
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            length: 0,
            blob_hash: String::new(),
            ingestion_time: Utc::now(),
            owner: String::new(),
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn ingested_at(mut self, time: DateTime<Utc>) -> Self {
        self.ingestion_time = time;
        self
    }

    /// Overwrite the store-computed fields.
    pub(crate) fn stamped(mut self, id: &BlobId, length: usize) -> Self {
        self.blob_hash = id.as_str().to_string();
        self.length = length as u64;
        self
    }
}

/// Serialize `record` to `path` atomically.
pub fn write(path: &Path, record: &BlobMeta, sync: bool) -> Result<()> {
    let json = encode(record)?;
    fsutil::write_atomic(path, &json, sync)?;
    Ok(())
}

/// Pretty JSON bytes for a record.
pub(crate) fn encode(record: &BlobMeta) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(record)
        .map_err(|e| CasError::CorruptData(format!("Failed to encode metadata: {}", e)))
}

/// Load a record. A missing file is `NotFound`, an unparsable one `CorruptData`.
pub fn read(path: &Path) -> Result<BlobMeta> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(CasError::NotFound {
                id: path.display().to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes).map_err(|e| {
        CasError::CorruptData(format!("Invalid metadata in {}: {}", path.display(), e))
    })
}
