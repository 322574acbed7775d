//! In-place symlink deduplication of an existing directory tree.

use crate::action::ActionLog;
use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::walk::{replace_with_symlink, walk_tree};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Statistics from a dedupe run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupeStats {
    /// Regular files hashed.
    pub files_scanned: usize,
    /// Files replaced by a symlink to an identical earlier file.
    pub duplicates_linked: usize,
    /// Sum of the sizes of the replaced files.
    pub bytes_saved: u64,
}

/// Digest index for one dedupe run.
///
/// Owned by the run, so concurrent runs never share state.
#[derive(Debug, Default)]
pub(crate) struct Deduper {
    first_seen: HashMap<Hash, PathBuf>,
    stats: DedupeStats,
}

impl Deduper {
    /// Hash `path` and, if its content was seen before, atomically replace it
    /// with a symlink to the first file seen with that content.
    ///
    /// `path` must already be known to be a regular file; it is recorded as
    /// given, so pass absolute paths to get absolute symlink targets.
    pub(crate) fn visit(&mut self, path: &Path, log: &dyn ActionLog) -> Result<()> {
        let hash = Hash::hash_file(path)?;
        self.stats.files_scanned += 1;

        let Some(first) = self.first_seen.get(&hash) else {
            self.first_seen.insert(hash, path.to_path_buf());
            return Ok(());
        };
        if first == path {
            // Same path listed twice; linking it to itself would lose the content
            return Ok(());
        }

        let len = fs::metadata(path)
            .map_err(|e| Error::io("stat", path, e))?
            .len();

        // Scratch symlink lives next to the file, so the rename never crosses filesystems
        let scratch_dir = path.parent().unwrap_or(Path::new("."));
        replace_with_symlink(first, path, scratch_dir)?;

        tracing::debug!(path = %path.display(), target = %first.display(), "replaced duplicate");
        log.record(&format!("symlink {} -> {}", path.display(), first.display()));

        self.stats.duplicates_linked += 1;
        self.stats.bytes_saved += len;
        Ok(())
    }

    pub(crate) fn finish(self) -> DedupeStats {
        tracing::info!(
            scanned = self.stats.files_scanned,
            linked = self.stats.duplicates_linked,
            bytes_saved = self.stats.bytes_saved,
            "dedupe finished"
        );
        self.stats
    }
}

/// Deduplicate every regular file under `root` in place.
///
/// Files are visited in file-name order; the first file with a given content
/// stays, and every later file with the same content becomes a symlink to it
/// (by absolute path). Hidden entries are skipped, as are hidden directories
/// and everything inside them. Symlinks and other non-regular entries are
/// left alone.
pub fn dedupe_dir(
    root: impl AsRef<Path>,
    cancel: &Cancellation,
    log: &dyn ActionLog,
) -> Result<DedupeStats> {
    let root = root.as_ref();
    let root = fs::canonicalize(root).map_err(|e| Error::path_resolution(root, e))?;

    let mut deduper = Deduper::default();
    walk_tree(&root, true, cancel, |path, file_type| {
        if !file_type.is_file() {
            if !file_type.is_dir() {
                tracing::debug!(path = %path.display(), "skipping non-regular file");
            }
            return Ok(());
        }
        deduper.visit(path, log)
    })?;

    Ok(deduper.finish())
}
