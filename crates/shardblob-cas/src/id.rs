//! Content addressing.
//!
//! An identifier is the lowercase hex SHA-256 of the plaintext payload. It is
//! never computed over sealed (compressed/encrypted) bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{CasError, Result};

/// Length of a SHA-256 identifier in hex characters.
pub const ID_HEX_LEN: usize = 64;

/// Hex-encoded content digest, the primary key of a stored object.
///
/// Any non-empty run of hex digits is accepted so that ids produced by a
/// non-standard addresser still round-trip through the store (see
/// [`crate::layout::shard`] for how short ids are placed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobId(String);

impl BlobId {
    /// Parse a caller-supplied id, normalising to lowercase.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CasError::InvalidId(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BlobId {
    type Err = CasError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BlobId {
    type Error = CasError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<BlobId> for String {
    fn from(id: BlobId) -> Self {
        id.0
    }
}

impl AsRef<str> for BlobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute the identifier of a plaintext payload.
///
/// Pure and deterministic; empty input yields the digest of the empty string.
#[inline]
pub fn identify(data: &[u8]) -> BlobId {
    BlobId(hex::encode(Sha256::digest(data)))
}
