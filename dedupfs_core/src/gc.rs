//! Garbage collection.

use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::walk::walk_tree;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Statistics from a garbage collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcStats {
    /// Regular files found under the data root.
    pub data_files_scanned: usize,
    /// Symlinks found under the link root.
    pub links_scanned: usize,
    /// Data files deleted (or that would be, on a dry run).
    pub data_files_deleted: usize,
    /// Bytes freed.
    pub bytes_freed: u64,
}

impl Store {
    /// Run garbage collection.
    ///
    /// Every data file not named by the target of some symlink under the link
    /// root is deleted. Reachability is recomputed from scratch on each run.
    /// If `dry_run` is true, reports what would be deleted without actually
    /// deleting.
    ///
    /// The first deletion failure aborts the run. Nothing is locked: a write
    /// that is between moving its data file in and publishing its link can
    /// lose the data file to a concurrent run.
    pub fn gc(&self, dry_run: bool, cancel: &Cancellation) -> Result<GcStats> {
        let mut stats = GcStats::default();

        // Collect phase: every data file is a candidate
        let mut candidates = self.collect_data_files(cancel)?;
        stats.data_files_scanned = candidates.len();

        // Mark phase: whatever a link points at survives
        stats.links_scanned = self.mark_linked(&mut candidates, cancel)?;

        // Sweep phase
        self.sweep(candidates, dry_run, cancel, &mut stats)?;

        tracing::info!(
            scanned = stats.data_files_scanned,
            links = stats.links_scanned,
            deleted = stats.data_files_deleted,
            bytes_freed = stats.bytes_freed,
            dry_run,
            "gc finished"
        );

        Ok(stats)
    }

    fn collect_data_files(&self, cancel: &Cancellation) -> Result<BTreeMap<PathBuf, u64>> {
        let mut candidates = BTreeMap::new();

        walk_tree(self.data_dir(), false, cancel, |path, file_type| {
            if !file_type.is_file() {
                return Ok(());
            }
            let metadata = fs::symlink_metadata(path).map_err(|e| Error::io("stat", path, e))?;
            candidates.insert(path.to_path_buf(), metadata.len());
            Ok(())
        })?;

        Ok(candidates)
    }

    fn mark_linked(
        &self,
        candidates: &mut BTreeMap<PathBuf, u64>,
        cancel: &Cancellation,
    ) -> Result<usize> {
        let mut links = 0;

        walk_tree(self.link_dir(), false, cancel, |path, file_type| {
            if !file_type.is_symlink() {
                return Ok(());
            }
            links += 1;

            let target = fs::read_link(path).map_err(|e| Error::io("readlink", path, e))?;
            if candidates.remove(&target).is_none() {
                // Dangling, already marked, or pointing outside the data root
                tracing::trace!(link = %path.display(), target = %target.display(), "link marks nothing");
            }
            Ok(())
        })?;

        Ok(links)
    }

    fn sweep(
        &self,
        candidates: BTreeMap<PathBuf, u64>,
        dry_run: bool,
        cancel: &Cancellation,
        stats: &mut GcStats,
    ) -> Result<()> {
        for (path, len) in candidates {
            cancel.check()?;

            if !dry_run {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    // Someone else got there first
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(Error::io("remove data file", &path, e)),
                }
                tracing::debug!(path = %path.display(), bytes = len, "deleted data file");
            }

            stats.data_files_deleted += 1;
            stats.bytes_freed += len;
        }

        Ok(())
    }
}
