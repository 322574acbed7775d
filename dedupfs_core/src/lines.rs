//! Dedupe a list of file paths read from a line-oriented stream.

use crate::action::ActionLog;
use crate::cancel::Cancellation;
use crate::dedupe::{DedupeStats, Deduper};
use crate::error::{Error, Result};
use std::fs;
use std::io::{self, BufRead};
use std::path::Path;

/// Iterator over the non-blank lines of a reader, trimmed.
#[derive(Debug)]
pub struct Lines<R> {
    reader: R,
    buf: String,
}

impl<R: BufRead> Lines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for Lines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    let line = self.buf.trim();
                    if !line.is_empty() {
                        return Some(Ok(line.to_string()));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Deduplicate the files named by `paths`, in order.
///
/// Each path must name a regular file (symlinks are followed). A file whose
/// content matches an earlier path is atomically replaced by a symlink to
/// that earlier path. The first failure stops the run.
pub fn dedupe_paths<I>(paths: I, cancel: &Cancellation, log: &dyn ActionLog) -> Result<DedupeStats>
where
    I: IntoIterator<Item = io::Result<String>>,
{
    let mut deduper = Deduper::default();

    for path in paths {
        cancel.check()?;

        let path = path.map_err(|source| Error::ReadInput { source })?;
        let path = Path::new(&path);

        let metadata = fs::metadata(path).map_err(|e| Error::io("stat", path, e))?;
        if !metadata.is_file() {
            return Err(Error::not_regular_file(path));
        }

        // Record the first-seen path absolute, so symlinks to it work from any directory
        let path = std::path::absolute(path).map_err(|e| Error::path_resolution(path, e))?;
        deduper.visit(&path, log)?;
    }

    Ok(deduper.finish())
}
