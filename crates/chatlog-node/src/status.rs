//! Status reporting hook
//!
//! The coordinator reports flush summaries and failures as single
//! human-readable lines. Hosts plug in their own sink; the default forwards
//! to `tracing`.

use parking_lot::Mutex;
use tracing::info;

/// Receives one-line status messages
pub trait StatusSink: Send + Sync {
    /// Report a status line
    fn report(&self, line: &str);
}

impl<F> StatusSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, line: &str) {
        self(line)
    }
}

/// Emits status lines as `info` events on the `chatlog::status` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatus;

impl StatusSink for TracingStatus {
    fn report(&self, line: &str) {
        info!(target: "chatlog::status", "{}", line);
    }
}

/// Keeps every status line in memory
#[derive(Debug, Default)]
pub struct CollectingStatus {
    lines: Mutex<Vec<String>>,
}

impl CollectingStatus {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines reported so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Whether any reported line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }
}

impl StatusSink for CollectingStatus {
    fn report(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
