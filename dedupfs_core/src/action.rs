//! Sinks for human-readable action lines emitted by the dedupe utilities.

/// Receives one line per action taken (e.g. a file replaced by a symlink).
pub trait ActionLog {
    fn record(&self, line: &str);
}

/// Discards every line. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLog;

impl ActionLog for NoopLog {
    fn record(&self, _line: &str) {}
}

/// Forwards each line as a `tracing` info event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl ActionLog for TracingLog {
    fn record(&self, line: &str) {
        tracing::info!(target: "dedupfs::action", "{}", line);
    }
}

impl<F> ActionLog for F
where
    F: Fn(&str),
{
    fn record(&self, line: &str) {
        self(line)
    }
}
