//! Error types for dedupfs_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using dedupfs_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during store and dedupe operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A configured path could not be made absolute.
    #[error("Cannot resolve absolute path for {path}: {source}")]
    PathResolution {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem operation failed on a specific path.
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Renaming a link-tree entry failed.
    #[error("rename {from} -> {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No entry exists at the link path.
    #[error("Link not found: {path}")]
    NotFound { path: PathBuf },

    /// The link exists but its data file is gone.
    #[error("Broken link {path} -> {target}")]
    BrokenLink { path: PathBuf, target: PathBuf },

    /// Input names something other than a regular file.
    #[error("Not a regular file: {path}")]
    NotRegularFile { path: PathBuf },

    /// Link path resolves to the link root itself.
    #[error("Invalid link path: {path:?} resolves to the link root")]
    InvalidLinkPath { path: String },

    /// A walk observed cancellation and stopped.
    #[error("Operation cancelled")]
    Cancelled,

    /// The primary rename/remove succeeded, but pruning empty directories afterwards failed.
    #[error("Pruning empty directories from {path} failed: {source}")]
    Prune {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// Store root is invalid or not initialized.
    #[error("Invalid store at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// Store config file is malformed.
    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    /// Invalid hash format or encoding.
    #[error("Invalid hash: {reason}")]
    InvalidHash { reason: String },

    /// Reading the input path stream failed.
    #[error("Read input: {source}")]
    ReadInput {
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create an Io error tagged with the operation and path.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Create a Rename error.
    pub fn rename(
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Error::Rename {
            from: from.into(),
            to: to.into(),
            source,
        }
    }

    /// Create a PathResolution error.
    pub fn path_resolution(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::PathResolution {
            path: path.into(),
            source,
        }
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Error::NotFound { path: path.into() }
    }

    /// Create a BrokenLink error.
    pub fn broken_link(path: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Error::BrokenLink {
            path: path.into(),
            target: target.into(),
        }
    }

    /// Create a NotRegularFile error.
    pub fn not_regular_file(path: impl Into<PathBuf>) -> Self {
        Error::NotRegularFile { path: path.into() }
    }

    /// Create an InvalidLinkPath error.
    pub fn invalid_link_path(path: impl Into<String>) -> Self {
        Error::InvalidLinkPath { path: path.into() }
    }

    /// Wrap a pruning failure that followed a successful primary operation.
    pub fn prune(path: impl Into<PathBuf>, source: Error) -> Self {
        Error::Prune {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(reason: impl Into<String>) -> Self {
        Error::InvalidHash {
            reason: reason.into(),
        }
    }

    /// True if the operation stopped because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// True if the primary operation succeeded and only the follow-up pruning failed.
    pub fn is_prune_failure(&self) -> bool {
        matches!(self, Error::Prune { .. })
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        let path = err.file.path().to_path_buf();
        Error::io("rename temp file into data", path, err.error)
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error, and may carry the path it failed on
        let path = walk_error_path(&err).unwrap_or_default();
        match err.io_error() {
            Some(io_err) => Error::io(
                "walk",
                path,
                std::io::Error::new(io_err.kind(), io_err.to_string()),
            ),
            None => Error::io("walk", path, std::io::Error::other(err.to_string())),
        }
    }
}

fn walk_error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            walk_error_path(err)
        }
        _ => None,
    }
}
