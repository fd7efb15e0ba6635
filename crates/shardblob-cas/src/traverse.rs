//! Recursive traversal of a store root.
//!
//! Statistics are computed in two steps: [`walk`] turns the tree into a list of
//! per-directory observations, and [`summarize`] reduces them. The reduction is
//! pure, so it can be tested without touching the filesystem.
//!
//! The key descriptor and temp files left by an interrupted write are not part
//! of the sharded layout and are ignored by both statistics and inventory.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::fsutil;
use crate::key::DESCRIPTOR_FILE;
use crate::layout;
use crate::sidecar::{self, BlobMeta};
use crate::Result;

/// Entry count of one directory at a given depth (root = 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirObservation {
    pub depth: usize,
    /// Files plus subdirectories directly inside the directory.
    pub entries: usize,
}

/// Raw result of walking a store root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Walk {
    /// One observation per directory, including empty ones, ordered by depth.
    pub observations: Vec<DirObservation>,
    /// Number of `*.blob` files found.
    pub object_count: u64,
}

/// Summary of how objects are spread over the sharded tree.
///
/// Entry counts include every file and subdirectory except the key descriptor
/// at the root and `*.tmp` leftovers of interrupted writes, which are not part
/// of the sharded layout and are never counted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_object_count: u64,
    /// Largest entry count among the directories at each depth.
    pub max_entries_per_level: Vec<usize>,
    /// Entries per non-empty directory, averaged over all depths.
    pub average_entries_per_level: f64,
}

fn is_ignored(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || entry.file_type().is_dir() {
        return false;
    }
    (entry.depth() == 1 && entry.file_name() == DESCRIPTOR_FILE)
        || fsutil::is_temp_file(entry.path())
}

fn entries(root: &Path) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_ignored(e))
}

/// Walk `root`, recording every directory's entry count and the object count.
pub fn walk(root: &Path) -> Result<Walk> {
    let mut dirs: HashMap<PathBuf, DirObservation> = HashMap::new();
    let mut object_count = 0u64;

    for entry in entries(root) {
        let entry = entry.map_err(io::Error::from)?;
        let depth = entry.depth();

        if entry.file_type().is_dir() {
            dirs.entry(entry.path().to_path_buf())
                .or_insert(DirObservation { depth, entries: 0 });
        } else if layout::is_object_file(entry.path()) {
            object_count += 1;
        }

        if depth > 0 {
            if let Some(parent) = entry.path().parent() {
                dirs.entry(parent.to_path_buf())
                    .or_insert(DirObservation {
                        depth: depth - 1,
                        entries: 0,
                    })
                    .entries += 1;
            }
        }
    }

    let mut observations: Vec<DirObservation> = dirs.into_values().collect();
    observations.sort_by_key(|o| (o.depth, o.entries));

    debug!(
        "[WALK] {:?}: {} directories, {} objects",
        root,
        observations.len(),
        object_count
    );

    Ok(Walk {
        observations,
        object_count,
    })
}

/// Reduce a walk to store statistics.
///
/// `max_entries_per_level` has one slot per depth down to the deepest directory
/// seen. The average is total entries divided by the number of directories that
/// held at least one entry, across all depths; empty directories widen the
/// per-level vector but do not count towards the average.
pub fn summarize(walk: &Walk) -> StoreStats {
    let deepest = walk
        .observations
        .iter()
        .map(|o| o.depth)
        .max()
        .unwrap_or(0);

    let mut max_entries_per_level = vec![0usize; deepest + 1];
    let mut total_entries = 0usize;
    let mut observed_dirs = 0usize;

    for obs in &walk.observations {
        let slot = &mut max_entries_per_level[obs.depth];
        *slot = (*slot).max(obs.entries);
        if obs.entries > 0 {
            total_entries += obs.entries;
            observed_dirs += 1;
        }
    }

    let average_entries_per_level = if observed_dirs > 0 {
        total_entries as f64 / observed_dirs as f64
    } else {
        0.0
    };

    StoreStats {
        total_object_count: walk.object_count,
        max_entries_per_level,
        average_entries_per_level,
    }
}

/// Path of some object under `root`, or `None` if the store holds no objects.
pub(crate) fn first_object(root: &Path) -> Result<Option<PathBuf>> {
    for entry in entries(root) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_dir() && layout::is_object_file(entry.path()) {
            return Ok(Some(entry.into_path()));
        }
    }
    Ok(None)
}

/// Collect the metadata of every object under `root`.
///
/// Objects whose sidecar is missing or unparsable are skipped, not reported as
/// errors. Order follows the walk; see [`sort_for_display`].
pub fn inventory(root: &Path) -> Result<Vec<BlobMeta>> {
    let mut records = Vec::new();

    for entry in entries(root) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_dir() || !layout::is_object_file(entry.path()) {
            continue;
        }
        let meta_path = layout::sidecar_of(entry.path());
        match sidecar::read(&meta_path) {
            Ok(meta) => records.push(meta),
            Err(e) => debug!("[WALK] skipping {:?}: {}", entry.path(), e),
        }
    }

    Ok(records)
}

/// Conventional presentation order: name ascending, newest ingestion first.
pub fn sort_for_display(records: &mut [BlobMeta]) {
    records.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| b.ingestion_time.cmp(&a.ingestion_time))
    });
}
