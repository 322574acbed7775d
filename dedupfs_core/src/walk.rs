//! Filesystem helpers: tree walking, empty-directory pruning and atomic symlink swaps.

use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use std::fs::{self, FileType};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Attempts at finding an unused scratch name before giving up.
const SCRATCH_ATTEMPTS: u32 = 16;

static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// Recursively walk `root`, calling `visit` for every entry below it.
///
/// Entries are visited depth-first in file-name order and symlinks are
/// never followed. The root itself is not passed to `visit`; a missing root
/// is an empty tree. With `skip_hidden`, dot-prefixed entries are skipped and
/// hidden directories are not descended into. `cancel` is checked before
/// each entry.
pub(crate) fn walk_tree<F>(
    root: &Path,
    skip_hidden: bool,
    cancel: &Cancellation,
    mut visit: F,
) -> Result<()>
where
    F: FnMut(&Path, FileType) -> Result<()>,
{
    match fs::symlink_metadata(root) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io("stat", root, e)),
    }

    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false) // No .gitignore/.ignore handling
        .hidden(skip_hidden)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    for entry in walker {
        cancel.check()?;

        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }

        let Some(file_type) = entry.file_type() else {
            continue;
        };

        visit(entry.path(), file_type)?;
    }

    Ok(())
}

/// Remove `root/rel_dir` and each of its ancestors while they are empty.
///
/// Stops at the first non-empty directory and never removes `root` itself.
/// A directory that no longer exists counts as already pruned, and its parent
/// is checked next.
pub(crate) fn prune_empty_dirs(root: &Path, rel_dir: &Path) -> Result<()> {
    let mut dir = rel_dir.to_path_buf();

    while dir.components().next().is_some() {
        let abs_dir = root.join(&dir);

        let empty = match fs::read_dir(&abs_dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(Error::io("read dir", &abs_dir, e)),
        };
        if !empty {
            return Ok(());
        }

        match fs::remove_dir(&abs_dir) {
            Ok(()) => tracing::debug!(dir = %abs_dir.display(), "pruned empty directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io("remove dir", &abs_dir, e)),
        }

        if !dir.pop() {
            break;
        }
    }

    Ok(())
}

/// Atomically make `dest` a symlink to `target`, replacing whatever file or
/// symlink is there.
///
/// The symlink is first created under a unique hidden name in `scratch_dir`
/// (which must be on the same filesystem as `dest`) and then renamed over
/// `dest`.
pub(crate) fn replace_with_symlink(target: &Path, dest: &Path, scratch_dir: &Path) -> Result<()> {
    let scratch = create_scratch_symlink(target, scratch_dir)?;

    if let Err(e) = fs::rename(&scratch, dest) {
        let _ = fs::remove_file(&scratch);
        return Err(Error::io("rename symlink into place", dest, e));
    }

    Ok(())
}

fn create_scratch_symlink(target: &Path, scratch_dir: &Path) -> Result<PathBuf> {
    for _ in 0..SCRATCH_ATTEMPTS {
        let scratch = scratch_dir.join(scratch_name());
        match symlink(target, &scratch) {
            Ok(()) => return Ok(scratch),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(Error::io("symlink", &scratch, e)),
        }
    }

    Err(Error::io(
        "symlink",
        scratch_dir,
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            "could not find an unused scratch name",
        ),
    ))
}

/// `.symlink-<pid>-<unix-nanos>-<seq>`: hidden, and unique within the process
/// even on coarse clocks.
fn scratch_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(".symlink-{}-{}-{}", std::process::id(), nanos, seq)
}

/// Create `path` and any missing parents with the given permission mode.
pub(crate) fn ensure_dir(path: &Path, mode: u32) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    set_dir_mode(&mut builder, mode);
    builder
        .create(path)
        .map_err(|e| Error::io("create dir", path, e))
}

#[cfg(unix)]
fn set_dir_mode(builder: &mut fs::DirBuilder, mode: u32) {
    use std::os::unix::fs::DirBuilderExt;
    builder.mode(mode);
}

/// Set directory mode (Windows no-op).
#[cfg(not(unix))]
fn set_dir_mode(_builder: &mut fs::DirBuilder, _mode: u32) {}

#[cfg(unix)]
pub(crate) fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub(crate) fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn visited(root: &Path, skip_hidden: bool) -> Vec<String> {
        let mut seen = Vec::new();
        walk_tree(root, skip_hidden, &Cancellation::none(), |path, _| {
            let rel = path.strip_prefix(root).unwrap();
            seen.push(rel.to_string_lossy().into_owned());
            Ok(())
        })
        .unwrap();
        seen
    }

    #[test]
    fn test_walk_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let seen = visited(&temp_dir.path().join("nope"), false);
        assert!(seen.is_empty());
    }

    #[test]
    fn test_walk_sorted_and_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("b/c")).unwrap();
        fs::write(root.join("b/c/z.txt"), b"z").unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();

        assert_eq!(visited(root, false), vec!["a.txt", "b", "b/c", "b/c/z.txt"]);
    }

    #[test]
    fn test_walk_skips_hidden_when_asked() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::write(root.join(".git/objects/x"), b"x").unwrap();
        fs::write(root.join(".bashrc"), b"rc").unwrap();
        fs::write(root.join("visible"), b"v").unwrap();

        assert_eq!(visited(root, true), vec!["visible"]);
        assert_eq!(visited(root, false).len(), 5);
    }

    #[test]
    #[cfg(unix)]
    fn test_walk_does_not_follow_symlinks() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        let elsewhere = temp_dir.path().join("elsewhere");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&elsewhere).unwrap();
        fs::write(elsewhere.join("inner"), b"i").unwrap();
        symlink(&elsewhere, &root.join("link")).unwrap();

        let mut types = Vec::new();
        walk_tree(&root, false, &Cancellation::none(), |path, ft| {
            types.push((path.file_name().unwrap().to_owned(), ft.is_symlink()));
            Ok(())
        })
        .unwrap();

        assert_eq!(types, vec![(std::ffi::OsString::from("link"), true)]);
    }

    #[test]
    fn test_walk_observes_cancellation() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a"), b"a").unwrap();

        let cancel = Cancellation::new();
        cancel.cancel();
        let result = walk_tree(temp_dir.path(), false, &cancel, |_, _| Ok(()));
        assert!(result.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_prune_removes_empty_chain_but_not_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("link");
        fs::create_dir_all(root.join("a/b/c")).unwrap();

        prune_empty_dirs(&root, Path::new("a/b/c")).unwrap();

        assert!(!root.join("a").exists());
        assert!(root.is_dir());
    }

    #[test]
    fn test_prune_stops_at_non_empty_ancestor() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("link");
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::write(root.join("a/keep"), b"k").unwrap();

        prune_empty_dirs(&root, Path::new("a/b/c")).unwrap();

        assert!(!root.join("a/b").exists());
        assert!(root.join("a/keep").exists());
    }

    #[test]
    fn test_prune_missing_leaf_continues_upwards() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("link");
        fs::create_dir_all(root.join("a")).unwrap();

        // "a/gone" never existed; "a" is empty and should still go
        prune_empty_dirs(&root, Path::new("a/gone")).unwrap();
        assert!(!root.join("a").exists());

        // Pruning again is a no-op
        prune_empty_dirs(&root, Path::new("a/gone")).unwrap();
        prune_empty_dirs(&root, Path::new("")).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    #[cfg(unix)]
    fn test_replace_with_symlink_overwrites_file() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("first"), b"same").unwrap();
        fs::write(dir.join("second"), b"same").unwrap();

        replace_with_symlink(&dir.join("first"), &dir.join("second"), dir).unwrap();

        assert_eq!(fs::read_link(dir.join("second")).unwrap(), dir.join("first"));
        // No scratch symlink left behind
        assert_eq!(fs::read_dir(dir).unwrap().count(), 2);
    }

    #[test]
    fn test_scratch_names_are_unique_and_hidden() {
        let a = scratch_name();
        let b = scratch_name();
        assert_ne!(a, b);
        assert!(a.starts_with('.'));
    }

    #[test]
    #[cfg(unix)]
    fn test_ensure_dir_applies_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("x/y");
        ensure_dir(&dir, 0o700).unwrap();

        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
