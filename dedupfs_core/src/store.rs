//! Store configuration and link-namespace operations.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::walk::{ensure_dir, prune_empty_dirs};
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

/// Directory permission mode used when the caller passes 0.
pub const DEFAULT_DIR_MODE: u32 = 0o700;

/// Hash algorithm name recorded in the store config.
const CONFIG_ALGO: &str = "sha512";

/// A deduplicated file store.
///
/// Three roots are involved:
/// - `temp/` holds in-progress writes
/// - `data/` holds one `<sha512-hex>.bin` file per unique content
/// - `link/` is the user-visible tree of symlinks pointing into `data/`
///
/// The roots are created lazily on first use.
#[derive(Debug, Clone)]
pub struct Store {
    temp_dir: PathBuf,
    data_dir: PathBuf,
    link_dir: PathBuf,
    dir_mode: u32,
}

impl Store {
    /// Construct a store over the given roots.
    ///
    /// Relative paths are resolved against the current working directory now,
    /// not when an operation runs. A `dir_mode` of 0 means 0o700.
    pub fn new(
        temp_dir: impl AsRef<Path>,
        data_dir: impl AsRef<Path>,
        link_dir: impl AsRef<Path>,
        dir_mode: u32,
    ) -> Result<Self> {
        Ok(Self {
            temp_dir: absolute(temp_dir.as_ref())?,
            data_dir: absolute(data_dir.as_ref())?,
            link_dir: absolute(link_dir.as_ref())?,
            dir_mode: if dir_mode == 0 {
                DEFAULT_DIR_MODE
            } else {
                dir_mode
            },
        })
    }

    /// Initialize a store rooted at a single directory.
    ///
    /// Creates the directory structure:
    /// - `temp/`, `data/` and `link/`
    /// - `config` file with version, algorithm and directory mode
    pub fn init<P: AsRef<Path>>(root: P, dir_mode: u32) -> Result<Self> {
        let root = absolute(root.as_ref())?;
        let store = Self::with_root(&root, dir_mode)?;

        ensure_dir(&root, store.dir_mode)?;
        ensure_dir(&store.temp_dir, store.dir_mode)?;
        ensure_dir(&store.data_dir, store.dir_mode)?;
        ensure_dir(&store.link_dir, store.dir_mode)?;

        let config_path = root.join("config");
        let config_content = format!(
            "version=1\nalgo={}\ndir_mode={:04o}\n",
            CONFIG_ALGO, store.dir_mode
        );
        fs::write(&config_path, config_content)
            .map_err(|e| Error::io("write config", &config_path, e))?;

        tracing::debug!(root = %root.display(), "initialized store");
        Ok(store)
    }

    /// Open a store previously created with [`Store::init`].
    ///
    /// Validates the root and reads the configuration.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = absolute(root.as_ref())?;

        if !root.is_dir() {
            return Err(Error::invalid_store(&root, "directory does not exist"));
        }

        let config_path = root.join("config");
        if !config_path.exists() {
            return Err(Error::invalid_store(&root, "config file not found"));
        }

        let config_content = fs::read_to_string(&config_path)
            .map_err(|e| Error::io("read config", &config_path, e))?;
        let dir_mode = Self::parse_config(&config_content)?;

        Self::with_root(&root, dir_mode)
    }

    fn with_root(root: &Path, dir_mode: u32) -> Result<Self> {
        Self::new(
            root.join("temp"),
            root.join("data"),
            root.join("link"),
            dir_mode,
        )
    }

    /// Parse the config file, returning the directory mode.
    fn parse_config(content: &str) -> Result<u32> {
        let mut version = None;
        let mut algo = None;
        let mut dir_mode = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                match key.trim() {
                    "version" => version = Some(value.trim()),
                    "algo" => algo = Some(value.trim()),
                    "dir_mode" => dir_mode = Some(value.trim()),
                    _ => {}
                }
            }
        }

        if version != Some("1") {
            return Err(Error::invalid_config(format!(
                "Unsupported config version: {:?}",
                version
            )));
        }

        match algo {
            Some(CONFIG_ALGO) => {}
            Some(other) => {
                return Err(Error::invalid_config(format!(
                    "Unsupported algo: {}",
                    other
                )));
            }
            None => return Err(Error::invalid_config("Missing algo in config")),
        }

        match dir_mode {
            None => Ok(DEFAULT_DIR_MODE),
            Some(mode) => u32::from_str_radix(mode.trim_start_matches("0o"), 8)
                .map_err(|_| Error::invalid_config(format!("Invalid dir_mode: {}", mode))),
        }
    }

    /// Scratch directory for in-progress writes.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Directory holding content-addressed data files.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Root of the link namespace.
    pub fn link_dir(&self) -> &Path {
        &self.link_dir
    }

    /// Permission mode for directories the store creates.
    pub fn dir_mode(&self) -> u32 {
        self.dir_mode
    }

    /// Get the path to the data file for a hash.
    ///
    /// Returns: `data/{hex}.bin`
    pub fn data_path(&self, hash: &Hash) -> PathBuf {
        self.data_dir.join(hash.data_file_name())
    }

    /// Absolute path of a link name. Never escapes the link root.
    pub fn link_path(&self, name: &str) -> PathBuf {
        self.link_dir.join(clean_link_name(name))
    }

    /// Cleaned relative name; rejects names that resolve to the link root.
    pub(crate) fn entry_name(&self, name: &str) -> Result<PathBuf> {
        let rel = clean_link_name(name);
        if rel.as_os_str().is_empty() {
            return Err(Error::invalid_link_path(name));
        }
        Ok(rel)
    }

    /// Open the content behind a link for reading.
    pub fn open_link(&self, name: &str) -> Result<fs::File> {
        let path = self.link_path(name);

        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(match fs::read_link(&path) {
                    Ok(target) => Error::broken_link(&path, target),
                    Err(_) => Error::not_found(&path),
                });
            }
            Err(e) => return Err(Error::io("open", &path, e)),
        };

        let metadata = file.metadata().map_err(|e| Error::io("stat", &path, e))?;
        if !metadata.is_file() {
            return Err(Error::not_regular_file(&path));
        }

        Ok(file)
    }

    /// Read the whole content behind a link.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let mut file = self.open_link(name)?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| Error::io("read", self.link_path(name), e))?;
        Ok(content)
    }

    /// Hash of the data file a link points to, taken from the symlink target.
    pub fn resolve(&self, name: &str) -> Result<Hash> {
        let path = self.link_path(name);
        let target = fs::read_link(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::not_found(&path),
            _ => Error::io("readlink", &path, e),
        })?;

        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::invalid_hash(format!("Not a data file: {}", target.display())))?;
        Hash::from_data_file_name(file_name)
    }

    /// Move a link (or a directory of links) to a new name.
    ///
    /// The data files stay where they are. After the move, empty directories
    /// left behind under the old name are pruned; if only that pruning fails
    /// the move is kept and an [`Error::Prune`] is returned.
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        let old_rel = self.entry_name(old_name)?;
        let new_rel = self.entry_name(new_name)?;
        let old_path = self.link_dir.join(&old_rel);
        let new_path = self.link_dir.join(&new_rel);

        if let Some(parent) = new_path.parent() {
            ensure_dir(parent, self.dir_mode)?;
        }

        if let Err(e) = fs::rename(&old_path, &new_path) {
            // Don't leave freshly created, still empty parents behind
            let _ = prune_empty_dirs(&self.link_dir, parent_of(&new_rel));
            return Err(Error::rename(old_path, new_path, e));
        }

        tracing::debug!(
            from = %old_path.display(),
            to = %new_path.display(),
            "renamed link"
        );

        self.prune_after(&old_rel)
    }

    /// Remove a link, or a whole directory of links.
    ///
    /// Data files are left alone; [`Store::gc`] reclaims them. Removing a name
    /// that does not exist is not an error.
    pub fn remove(&self, name: &str) -> Result<()> {
        let rel = self.entry_name(name)?;
        let path = self.link_dir.join(&rel);

        match fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.is_dir() => {
                fs::remove_dir_all(&path).map_err(|e| Error::io("remove dir", &path, e))?
            }
            Ok(_) => fs::remove_file(&path).map_err(|e| Error::io("remove", &path, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io("stat", &path, e)),
        }

        tracing::debug!(link = %path.display(), "removed link");

        self.prune_after(&rel)
    }

    fn prune_after(&self, rel: &Path) -> Result<()> {
        let dir = parent_of(rel);
        prune_empty_dirs(&self.link_dir, dir)
            .map_err(|e| Error::prune(self.link_dir.join(dir), e))
    }
}

/// Force a link name under the root: `.` and empty components are dropped,
/// `..` never climbs above the root.
pub(crate) fn clean_link_name(name: &str) -> PathBuf {
    let mut clean = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::ParentDir => {
                clean.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    clean
}

fn parent_of(rel: &Path) -> &Path {
    rel.parent().unwrap_or(Path::new(""))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| Error::path_resolution(path, e))
}
