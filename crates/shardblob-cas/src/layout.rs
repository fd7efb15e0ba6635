//! Path sharding scheme.
//!
//! An id `ba7816bf8f01...` lands at `ba/781/6bf/8f01....blob`: three nested
//! directory levels of 2, 3 and 3 hex characters, the remainder as the file
//! name. With uniformly distributed ids the first level holds at most 256
//! entries and each deeper level at most 4096.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::id::BlobId;

/// Extension of sealed object files.
pub const OBJECT_EXTENSION: &str = "blob";

/// Appended to an object path to name its metadata sidecar.
pub const SIDECAR_SUFFIX: &str = ".meta";

/// Shard widths, in hex characters, for each directory level.
const LEVELS: [usize; 3] = [2, 3, 3];

/// Minimum id length that can be sharded; shorter ids use a flat file name.
pub const MIN_SHARDED_LEN: usize = 8;

/// Map an id to its object path relative to the store root.
///
/// Ids shorter than [`MIN_SHARDED_LEN`] fall back to `<id>.blob` at the root.
pub fn shard(id: &BlobId) -> PathBuf {
    let hex = id.as_str();
    if hex.len() < MIN_SHARDED_LEN {
        return PathBuf::from(format!("{}.{}", hex, OBJECT_EXTENSION));
    }

    let mut path = PathBuf::new();
    let mut offset = 0;
    for width in LEVELS {
        path.push(&hex[offset..offset + width]);
        offset += width;
    }
    path.push(format!("{}.{}", &hex[offset..], OBJECT_EXTENSION));
    path
}

/// Directory (relative to the root) that holds the object for `id`.
pub fn shard_dir(id: &BlobId) -> PathBuf {
    shard(id)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// Sidecar path for an object path: the same path with [`SIDECAR_SUFFIX`] appended.
pub fn sidecar_of(object_path: &Path) -> PathBuf {
    let mut s: OsString = object_path.as_os_str().to_owned();
    s.push(SIDECAR_SUFFIX);
    PathBuf::from(s)
}

/// True if `path` names a sealed object file (`*.blob`).
///
/// Matches on the file name suffix rather than `Path::extension`, which does
/// not treat the bare `.blob` name of an 8-character id as having one.
pub fn is_object_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(OBJECT_EXTENSION))
        .is_some_and(|stem| stem.ends_with('.'))
}
