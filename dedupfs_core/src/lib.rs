//! # dedupfs core
//!
//! A deduplicated local file store.
//!
//! Content is stored once per unique SHA-512 digest under `data/`, and the
//! user-visible namespace under `link/` is a tree of symlinks into it. Writes
//! are staged in `temp/` and published with atomic renames, so a reader never
//! sees a partially written file.
//!
//! ## Features
//!
//! - Content-addressed data files named `<sha512-hex>.bin`
//! - Create/open/rename/remove on link names, with empty-directory pruning
//! - Mark-and-sweep garbage collection of unreferenced data files
//! - In-place symlink dedupe of existing directories and path lists
//!
//! ## Example
//!
//! ```no_run
//! use dedupfs_core::{Cancellation, Store};
//! use std::io::Write;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::init("./my-store", 0o700)?;
//!
//! let mut writer = store.create("docs/readme.txt")?;
//! writer.write_all(b"hello")?;
//! let hash = writer.close()?;
//! println!("stored {}", hash);
//!
//! store.rename("docs/readme.txt", "archive/readme.txt")?;
//! store.remove("archive/readme.txt")?;
//!
//! let stats = store.gc(false, &Cancellation::none())?;
//! println!("Deleted {} data files", stats.data_files_deleted);
//! # Ok(())
//! # }
//! ```

mod action;
mod cancel;
mod dedupe;
mod error;
mod gc;
mod hash;
mod lines;
mod store;
mod walk;
mod writer;

pub use action::{ActionLog, NoopLog, TracingLog};
pub use cancel::Cancellation;
pub use dedupe::{DedupeStats, dedupe_dir};
pub use error::{Error, Result};
pub use gc::GcStats;
pub use hash::{DATA_EXT, HASH_SIZE, Hash, Hasher};
pub use lines::{Lines, dedupe_paths};
pub use store::{DEFAULT_DIR_MODE, Store};
pub use writer::DataWriter;
