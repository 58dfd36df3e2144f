//! Flush policy
//!
//! Decides, after each append, whether a channel's pending entries must be
//! persisted now. Pure: no I/O and no state.

use serde::{Deserialize, Serialize};

use crate::entry::LogEntry;

/// Default number of pending entries that triggers a flush
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default message length (in characters) above which a flush is immediate
pub const DEFAULT_LONG_MESSAGE_CHARS: usize = 100;

/// Why a flush was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The channel's pending count reached the batch size
    BatchFull,
    /// The appended message was longer than the long-message limit
    LongMessage,
}

/// Thresholds that trigger a channel flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushPolicy {
    /// Flush once this many entries are pending (0 behaves as 1)
    pub batch_size: usize,
    /// Flush immediately when a message is longer than this
    pub long_message_chars: usize,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            long_message_chars: DEFAULT_LONG_MESSAGE_CHARS,
        }
    }
}

impl FlushPolicy {
    /// Create a policy with explicit thresholds
    pub fn new(batch_size: usize, long_message_chars: usize) -> Self {
        Self {
            batch_size,
            long_message_chars,
        }
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the long-message limit
    pub fn with_long_message_chars(mut self, chars: usize) -> Self {
        self.long_message_chars = chars;
        self
    }

    /// Whether the channel must be flushed after `last` was appended
    pub fn should_flush(&self, pending_count: usize, last: &LogEntry) -> bool {
        self.trigger(pending_count, last).is_some()
    }

    /// The reason to flush, if any
    ///
    /// A full batch takes precedence when both rules match.
    pub fn trigger(&self, pending_count: usize, last: &LogEntry) -> Option<FlushTrigger> {
        if pending_count >= self.batch_size.max(1) {
            Some(FlushTrigger::BatchFull)
        } else if last.text_chars() > self.long_message_chars {
            Some(FlushTrigger::LongMessage)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_len(len: usize) -> LogEntry {
        LogEntry::new("alice", "x".repeat(len), "general")
    }

    #[test]
    fn test_defaults() {
        let policy = FlushPolicy::default();
        assert_eq!(policy.batch_size, 10);
        assert_eq!(policy.long_message_chars, 100);
    }

    #[test]
    fn test_below_thresholds_does_not_flush() {
        let policy = FlushPolicy::default();
        for count in 1..10 {
            assert!(!policy.should_flush(count, &entry_with_len(100)));
        }
    }

    #[test]
    fn test_batch_full_flushes() {
        let policy = FlushPolicy::default();
        let short = entry_with_len(5);
        assert_eq!(policy.trigger(10, &short), Some(FlushTrigger::BatchFull));
        assert!(policy.should_flush(11, &short));
    }

    #[test]
    fn test_long_message_flushes_immediately() {
        let policy = FlushPolicy::default();
        assert_eq!(
            policy.trigger(1, &entry_with_len(101)),
            Some(FlushTrigger::LongMessage)
        );
        assert!(!policy.should_flush(1, &entry_with_len(100)));
    }

    #[test]
    fn test_long_message_counts_characters_not_bytes() {
        let policy = FlushPolicy::default();
        let wide = LogEntry::new("alice", "é".repeat(60), "general");
        assert!(!policy.should_flush(1, &wide));
    }

    #[test]
    fn test_zero_batch_size_flushes_every_entry() {
        let policy = FlushPolicy::new(0, 100);
        assert!(policy.should_flush(1, &entry_with_len(1)));
    }

    #[test]
    fn test_builder_setters() {
        let policy = FlushPolicy::default()
            .with_batch_size(3)
            .with_long_message_chars(20);
        assert!(policy.should_flush(3, &entry_with_len(1)));
        assert!(policy.should_flush(1, &entry_with_len(21)));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let policy: FlushPolicy = serde_json::from_str(r#"{"batch_size": 25}"#).unwrap();
        assert_eq!(policy.batch_size, 25);
        assert_eq!(policy.long_message_chars, DEFAULT_LONG_MESSAGE_CHARS);
    }
}
