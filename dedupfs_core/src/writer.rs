//! Write path: temp file, then data file, then link.

use crate::error::{Error, Result};
use crate::hash::{DATA_EXT, Hash, Hasher};
use crate::store::Store;
use crate::walk::{ensure_dir, prune_empty_dirs, replace_with_symlink};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

/// An in-progress write, returned by [`Store::create`].
///
/// Bytes go to a temp file under the store's temp root and into a running
/// SHA-512 at the same time. Nothing is visible in the data or link roots
/// until [`DataWriter::close`]. Dropping the writer without closing it
/// deletes the temp file.
#[derive(Debug)]
pub struct DataWriter {
    temp: NamedTempFile,
    hasher: Hasher,
    bytes_written: u64,
    data_dir: PathBuf,
    link_dir: PathBuf,
    link_rel: PathBuf,
    dir_mode: u32,
}

impl Store {
    /// Start writing content for the link `name`.
    ///
    /// An existing link with the same name is replaced when the writer is
    /// closed.
    pub fn create(&self, name: &str) -> Result<DataWriter> {
        let rel = self.entry_name(name)?;

        ensure_dir(self.temp_dir(), self.dir_mode())?;

        let prefix = format!("{}-", unix_nanos());
        let temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&format!(".{}", DATA_EXT))
            .tempfile_in(self.temp_dir())
            .map_err(|e| Error::io("create temp file", self.temp_dir(), e))?;

        tracing::debug!(temp = %temp.path().display(), link = %rel.display(), "created temp file");

        Ok(DataWriter {
            temp,
            hasher: Hasher::new(),
            bytes_written: 0,
            data_dir: self.data_dir().to_path_buf(),
            link_dir: self.link_dir().to_path_buf(),
            link_rel: rel,
            dir_mode: self.dir_mode(),
        })
    }

    /// Copy everything from `reader` into the link `name`.
    ///
    /// Returns the content hash.
    pub fn put<R: Read>(&self, name: &str, mut reader: R) -> Result<Hash> {
        let mut writer = self.create(name)?;
        io::copy(&mut reader, &mut writer).map_err(|e| Error::io("write", writer.temp_path(), e))?;
        writer.close()
    }
}

impl DataWriter {
    /// Bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Path of the temp file backing this writer.
    pub fn temp_path(&self) -> PathBuf {
        self.temp.path().to_path_buf()
    }

    /// Final link path this writer publishes on close.
    pub fn link_path(&self) -> PathBuf {
        self.link_dir.join(&self.link_rel)
    }

    /// Commit the write.
    ///
    /// The temp file is renamed to `data/<hex>.bin`, replacing an identical
    /// file if one is there, and the link is then atomically pointed at it.
    /// Returns the content hash. If the link cannot be published, link
    /// directories created for it are pruned again; the data file stays for
    /// GC to reclaim.
    pub fn close(self) -> Result<Hash> {
        let DataWriter {
            mut temp,
            hasher,
            bytes_written,
            data_dir,
            link_dir,
            link_rel,
            dir_mode,
        } = self;

        temp.flush()
            .map_err(|e| Error::io("flush", temp.path(), e))?;
        let hash = hasher.finalize();

        ensure_dir(&data_dir, dir_mode)?;
        let data_path = data_dir.join(hash.data_file_name());
        temp.persist(&data_path)?;

        let link_path = link_dir.join(&link_rel);
        if let Err(e) = publish_link(&data_path, &link_path, dir_mode) {
            let _ = prune_empty_dirs(&link_dir, link_rel.parent().unwrap_or(Path::new("")));
            return Err(e);
        }

        tracing::debug!(
            link = %link_path.display(),
            hash = %hash,
            bytes = bytes_written,
            "committed write"
        );

        Ok(hash)
    }

    /// Discard the write and delete the temp file.
    pub fn abort(self) -> Result<()> {
        let path = self.temp_path();
        self.temp
            .close()
            .map_err(|e| Error::io("remove temp file", path, e))
    }
}

impl Write for DataWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.temp.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

/// Point `link_path` at `data_path`. The scratch symlink is created next to
/// the link, so the final rename never crosses filesystems.
fn publish_link(data_path: &Path, link_path: &Path, dir_mode: u32) -> Result<()> {
    let parent = link_path.parent().unwrap_or(Path::new("."));
    ensure_dir(parent, dir_mode)?;
    replace_with_symlink(data_path, link_path, parent)
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // echo -n DUMMY | sha512sum
    const DUMMY_SHA512: &str = "0a8649de6b948fac1722c82ee07f4e3e8386a071750daf23c56fbba31acc922323b362fe10327e7e3322bc9354df59e02ded56f7f6f0ebfd6e99702154299d51";

    fn setup(temp_dir: &TempDir) -> Store {
        let root = temp_dir.path();
        Store::new(root.join("temp"), root.join("data"), root.join("link"), 0o700).unwrap()
    }

    #[test]
    fn test_create_and_close() {
        let temp_dir = TempDir::new().unwrap();
        let store = setup(&temp_dir);

        let mut writer = store.create("sub/dir/file.txt").unwrap();
        writer.write_all(b"DUM").unwrap();
        writer.write_all(b"MY").unwrap();
        assert_eq!(writer.bytes_written(), 5);
        let hash = writer.close().unwrap();

        assert_eq!(hash.to_hex(), DUMMY_SHA512);

        let data_path = temp_dir
            .path()
            .join("data")
            .join(format!("{}.bin", DUMMY_SHA512));
        assert_eq!(fs::read(&data_path).unwrap(), b"DUMMY");

        let link = store.link_dir().join("sub/dir/file.txt");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), data_path);

        // No scratch entries left in temp/ or next to the link
        assert_eq!(fs::read_dir(store.temp_dir()).unwrap().count(), 0);
        assert_eq!(fs::read_dir(store.link_dir().join("sub/dir")).unwrap().count(), 1);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_link_root_on_another_filesystem() {
        use std::os::unix::fs::MetadataExt;

        // tmpfs, usually a different device than the default temp dir
        let Ok(fast) = TempDir::new_in("/dev/shm") else {
            return;
        };
        let slow = TempDir::new().unwrap();
        let fast_dev = fs::metadata(fast.path()).unwrap().dev();
        let slow_dev = fs::metadata(slow.path()).unwrap().dev();
        if fast_dev == slow_dev {
            return;
        }

        let store = Store::new(
            fast.path().join("temp"),
            fast.path().join("data"),
            slow.path().join("link"),
            0,
        )
        .unwrap();

        let hash = store.put("a/b/f.txt", &b"X"[..]).unwrap();

        assert_eq!(store.read("a/b/f.txt").unwrap(), b"X");
        assert_eq!(
            fs::read_link(store.link_path("a/b/f.txt")).unwrap(),
            store.data_path(&hash)
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_failed_publication_prunes_new_link_dirs() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for dir in ["temp", "data", "link"] {
            fs::create_dir(root.join(dir)).unwrap();
        }

        // Directories created by this store are not writable, so the link
        // parent can be made but nothing can be put inside it
        let store = Store::new(root.join("temp"), root.join("data"), root.join("link"), 0o500).unwrap();

        let locked = root.join("locked-check");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();
        let enforced = fs::write(locked.join("x"), b"").is_err();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();
        if !enforced {
            return;
        }

        let hash = Hash::hash_bytes(b"X");
        let result = store.put("a/b/f.txt", &b"X"[..]);

        assert!(result.is_err());
        assert!(!store.link_dir().join("a").exists());
        assert!(store.link_dir().is_dir());
        // The data file is committed before the link; gc reclaims it
        assert!(store.data_path(&hash).exists());
    }

    #[test]
    fn test_nothing_visible_before_close() {
        let temp_dir = TempDir::new().unwrap();
        let store = setup(&temp_dir);

        let mut writer = store.create("file.txt").unwrap();
        writer.write_all(b"DUMMY").unwrap();

        assert!(writer.temp_path().starts_with(store.temp_dir()));
        assert!(writer.temp_path().to_string_lossy().ends_with(".bin"));
        assert!(!store.data_dir().exists());
        assert!(fs::symlink_metadata(store.link_path("file.txt")).is_err());

        writer.close().unwrap();
        assert!(store.link_path("file.txt").exists());
    }

    #[test]
    fn test_same_content_shares_data_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = setup(&temp_dir);

        let a = store.put("a.txt", &b"DUMMY"[..]).unwrap();
        let b = store.put("deep/b.txt", &b"DUMMY"[..]).unwrap();

        assert_eq!(a, b);
        assert_eq!(fs::read_dir(store.data_dir()).unwrap().count(), 1);
        assert_eq!(
            fs::read_link(store.link_path("a.txt")).unwrap(),
            fs::read_link(store.link_path("deep/b.txt")).unwrap()
        );
    }

    #[test]
    fn test_create_overwrites_existing_link() {
        let temp_dir = TempDir::new().unwrap();
        let store = setup(&temp_dir);

        store.put("file.txt", &b"first"[..]).unwrap();
        let second = store.put("file.txt", &b"second"[..]).unwrap();

        assert_eq!(store.read("file.txt").unwrap(), b"second");
        assert_eq!(
            fs::read_link(store.link_path("file.txt")).unwrap(),
            store.data_path(&second)
        );
        // The old data file stays until gc
        assert_eq!(fs::read_dir(store.data_dir()).unwrap().count(), 2);
    }

    #[test]
    fn test_empty_content() {
        let temp_dir = TempDir::new().unwrap();
        let store = setup(&temp_dir);

        let hash = store.create("empty").unwrap().close().unwrap();
        assert_eq!(hash, Hash::hash_bytes(b""));
        assert_eq!(store.read("empty").unwrap(), b"");
    }

    #[test]
    fn test_abort_leaves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = setup(&temp_dir);

        let mut writer = store.create("file.txt").unwrap();
        writer.write_all(b"DUMMY").unwrap();
        let temp_path = writer.temp_path();
        writer.abort().unwrap();

        assert!(!temp_path.exists());
        assert!(!store.data_dir().exists());
        assert!(fs::symlink_metadata(store.link_path("file.txt")).is_err());
    }

    #[test]
    fn test_drop_removes_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = setup(&temp_dir);

        let temp_path = {
            let mut writer = store.create("file.txt").unwrap();
            writer.write_all(b"DUMMY").unwrap();
            writer.temp_path()
        };

        assert!(!temp_path.exists());
    }

    #[test]
    fn test_create_rejects_link_root() {
        let temp_dir = TempDir::new().unwrap();
        let store = setup(&temp_dir);

        assert!(matches!(
            store.create("/"),
            Err(Error::InvalidLinkPath { .. })
        ));
        assert!(!store.temp_dir().exists());
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32,
            max_shrink_iters: 1000,
            ..ProptestConfig::default()
        })]

        /// Identical content lands in one data file, whatever the link names
        #[test]
        fn prop_content_addressing_deterministic(
            content in prop::collection::vec(any::<u8>(), 0..2048),
            names in prop::collection::btree_set("[a-z]{1,6}(/[a-z]{1,6}){0,2}", 1..5)
        ) {
            let temp_dir = TempDir::new().unwrap();
            let store = setup(&temp_dir);

            // A name may be the parent dir of another; only the first of a clashing pair succeeds
            let mut written = Vec::new();
            for name in &names {
                if let Ok(hash) = store.put(name, &content[..]) {
                    written.push(hash);
                }
            }

            prop_assert!(!written.is_empty());
            prop_assert!(written.iter().all(|h| *h == Hash::hash_bytes(&content)));
            prop_assert_eq!(fs::read_dir(store.data_dir()).unwrap().count(), 1);
        }
    }
}
