//! Collaborator-facing event and result types

use std::collections::BTreeMap;

use chatlog_storage::{ChannelKey, FlushTrigger, LogEntry, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed chat message, as supplied by the host
///
/// The logger stamps the entry itself at append time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Stable channel identifier
    #[serde(alias = "channel_id")]
    pub channel_key: ChannelKey,
    /// Human-readable channel label
    #[serde(alias = "channel")]
    pub channel_name: String,
    /// Display name of the author
    #[serde(alias = "user")]
    pub author: String,
    /// Message body
    #[serde(alias = "content")]
    pub text: String,
}

impl ChatEvent {
    /// Create a new event
    pub fn new(
        channel_key: impl Into<ChannelKey>,
        channel_name: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel_key: channel_key.into(),
            channel_name: channel_name.into(),
            author: author.into(),
            text: text.into(),
        }
    }

    /// Split into the channel key and an entry stamped at `time`
    pub fn into_entry(self, time: DateTime<Utc>) -> (ChannelKey, LogEntry) {
        let entry = LogEntry::at(time, self.author, self.text, self.channel_name);
        (self.channel_key, entry)
    }
}

/// What happened to an appended message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Buffered; no flush was due
    Buffered {
        /// Pending entries for the channel after the append
        pending: usize,
    },
    /// A flush was due but one is already in flight for the channel
    Deferred {
        /// Pending entries for the channel after the append
        pending: usize,
    },
    /// The append triggered a flush that succeeded
    Flushed {
        /// Entries written by the flush
        written: usize,
        /// Rule that triggered the flush
        trigger: FlushTrigger,
    },
    /// The append triggered a flush that failed (already reported)
    FlushFailed,
    /// The logger is not running; the message was dropped
    Rejected,
}

impl AppendOutcome {
    /// Whether the message was accepted into the logger
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Per-channel results of a flush-all pass
#[derive(Debug, Default)]
pub struct FlushReport {
    results: BTreeMap<ChannelKey, Result<usize, StorageError>>,
}

impl FlushReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a channel's result
    pub fn insert(&mut self, channel: ChannelKey, result: Result<usize, StorageError>) {
        self.results.insert(channel, result);
    }

    /// Result for one channel
    pub fn get(&self, channel: &ChannelKey) -> Option<&Result<usize, StorageError>> {
        self.results.get(channel)
    }

    /// Number of channels in the report
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no channel was flushed
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Entries written across all successful channels
    pub fn total_written(&self) -> usize {
        self.results.values().filter_map(|r| r.as_ref().ok()).sum()
    }

    /// Channels whose flush failed
    pub fn failures(&self) -> impl Iterator<Item = (&ChannelKey, &StorageError)> {
        self.results
            .iter()
            .filter_map(|(channel, result)| result.as_ref().err().map(|e| (channel, e)))
    }

    /// Whether every channel flushed successfully
    pub fn is_success(&self) -> bool {
        self.results.values().all(Result::is_ok)
    }

    /// Iterate over every channel's result
    pub fn iter(&self) -> impl Iterator<Item = (&ChannelKey, &Result<usize, StorageError>)> {
        self.results.iter()
    }

    /// Take the underlying map
    pub fn into_inner(self) -> BTreeMap<ChannelKey, Result<usize, StorageError>> {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_into_entry() {
        let time = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let event = ChatEvent::new("42", "general", "alice", "hi");
        let (channel, entry) = event.into_entry(time);

        assert_eq!(channel, ChannelKey::new("42"));
        assert_eq!(entry.author, "alice");
        assert_eq!(entry.channel_name, "general");
        assert_eq!(entry.timestamp_utc, "2024-01-02T03:04:05.000Z");
    }

    #[test]
    fn test_event_accepts_aliases() {
        let event: ChatEvent = serde_json::from_str(
            r#"{"channel_id": "7", "channel": "dm", "user": "bob", "content": "yo"}"#,
        )
        .unwrap();
        assert_eq!(event, ChatEvent::new("7", "dm", "bob", "yo"));
    }

    #[test]
    fn test_report_totals() {
        let mut report = FlushReport::new();
        report.insert(ChannelKey::new("a"), Ok(3));
        report.insert(ChannelKey::new("b"), Ok(4));
        assert_eq!(report.total_written(), 7);
        assert!(report.is_success());

        report.insert(
            ChannelKey::new("c"),
            Err(StorageError::Timeout(ChannelKey::new("c"))),
        );
        assert!(!report.is_success());
        assert_eq!(report.len(), 3);
        assert_eq!(report.total_written(), 7);

        let failed: Vec<_> = report.failures().map(|(c, _)| c.as_str()).collect();
        assert_eq!(failed, vec!["c"]);
    }

    #[test]
    fn test_rejected_is_not_accepted() {
        assert!(!AppendOutcome::Rejected.is_accepted());
        assert!(AppendOutcome::FlushFailed.is_accepted());
        assert!(AppendOutcome::Buffered { pending: 1 }.is_accepted());
    }
}
