//! Cooperative cancellation for long-running walks.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A cloneable stop signal checked between filesystem entries.
///
/// Clones share the same flag, so cancelling any clone stops every walk
/// holding one. An optional deadline fires on its own without anyone
/// calling [`Cancellation::cancel`].
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    stop: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// A token that only fires when `cancel` is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that never fires unless cancelled explicitly.
    pub fn none() -> Self {
        Self::default()
    }

    /// Add (or replace) an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Add a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Raise the stop flag.
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// `Err(Error::Cancelled)` once the flag is raised or the deadline passed.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
