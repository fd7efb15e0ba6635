//! Filesystem helpers for crash-safe writes.
//!
//! Files are written under a temporary name in their destination directory and
//! renamed into place, so a partially written file is never visible at its
//! canonical path.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Suffix of in-flight temporary files.
pub(crate) const TEMP_SUFFIX: &str = ".tmp";

/// Temporary sibling of `path`, unique per process and thread.
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_name = format!(
        "{}.{}.{:?}{}",
        name,
        std::process::id(),
        std::thread::current().id(),
        TEMP_SUFFIX
    );
    path.with_file_name(temp_name)
}

/// True for leftovers of an interrupted write.
pub(crate) fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(TEMP_SUFFIX))
}

/// Write `data` to a temporary sibling of `dest` and return the temp path.
///
/// The caller finishes the write with [`commit`]; on error the temp file is removed.
pub(crate) fn write_temp(dest: &Path, data: &[u8], sync: bool) -> io::Result<PathBuf> {
    let temp_path = temp_path_for(dest);
    let result: io::Result<()> = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        if sync {
            file.sync_all()?;
        }
        Ok(())
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(temp_path)
}

/// Rename a temp file onto its destination.
///
/// On some platforms (notably Windows) `fs::rename` fails if the destination
/// already exists; the destination is removed and the rename retried once.
/// The temp file is cleaned up if the rename ultimately fails.
pub(crate) fn commit(temp_path: &Path, destination: &Path) -> io::Result<()> {
    if let Err(initial_err) = fs::rename(temp_path, destination) {
        let _ = fs::remove_file(destination);
        fs::rename(temp_path, destination).map_err(|retry_err| {
            let _ = fs::remove_file(temp_path);
            io::Error::new(
                retry_err.kind(),
                format!(
                    "Atomic rename failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            )
        })?;
    }
    Ok(())
}

/// Write `data` to `dest` atomically.
pub(crate) fn write_atomic(dest: &Path, data: &[u8], sync: bool) -> io::Result<()> {
    let temp = write_temp(dest, data, sync)?;
    commit(&temp, dest)
}

/// Remove a file, treating absence as success.
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
