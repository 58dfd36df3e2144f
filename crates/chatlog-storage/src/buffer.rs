//! In-memory pending entry store
//!
//! Holds the entries that have been observed but not yet persisted, keyed by
//! channel. A channel present in the map always has at least one entry.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::trace;

use crate::entry::{ChannelKey, LogEntry};

/// Pending entries per channel, in arrival order
///
/// Uses `DashMap` so appends and drains only need `&self`. A drain removes
/// the channel's whole sequence in one step, so entries added while a flush
/// is in flight land in a fresh sequence for the next flush.
#[derive(Debug, Default)]
pub struct EntryStore {
    /// Map from channel key to its pending entries
    pending: DashMap<ChannelKey, Vec<LogEntry>>,
    /// Total count of pending entries (across all channels)
    total_count: AtomicUsize,
}

impl EntryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to the channel's pending sequence
    ///
    /// Returns the channel's pending count after the insert.
    pub fn add(&self, channel: &ChannelKey, entry: LogEntry) -> usize {
        let mut entries = self.pending.entry(channel.clone()).or_default();
        entries.push(entry);
        self.total_count.fetch_add(1, Ordering::SeqCst);

        let count = entries.len();
        trace!(channel = %channel, pending = count, "Buffered entry");
        count
    }

    /// Remove and return every pending entry for the channel
    ///
    /// Returns an empty vector when nothing is pending.
    pub fn drain(&self, channel: &ChannelKey) -> Vec<LogEntry> {
        match self.pending.remove(channel) {
            Some((_, entries)) => {
                self.total_count.fetch_sub(entries.len(), Ordering::SeqCst);
                entries
            }
            None => Vec::new(),
        }
    }

    /// Put a drained batch back in front of anything appended since
    pub fn requeue(&self, channel: &ChannelKey, mut batch: Vec<LogEntry>) {
        if batch.is_empty() {
            return;
        }

        let requeued = batch.len();
        let mut entries = self.pending.entry(channel.clone()).or_default();
        batch.append(&mut entries);
        *entries = batch;
        self.total_count.fetch_add(requeued, Ordering::SeqCst);

        trace!(channel = %channel, requeued, pending = entries.len(), "Requeued batch");
    }

    /// Channels that currently have pending entries
    pub fn channels_with_pending(&self) -> BTreeSet<ChannelKey> {
        self.pending
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of pending entries for a channel
    pub fn pending_count(&self, channel: &ChannelKey) -> usize {
        self.pending.get(channel).map_or(0, |entries| entries.len())
    }

    /// Copy of a channel's pending entries
    pub fn snapshot(&self, channel: &ChannelKey) -> Vec<LogEntry> {
        self.pending
            .get(channel)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Get the total count of pending entries
    pub fn total_pending(&self) -> usize {
        self.total_count.load(Ordering::SeqCst)
    }

    /// Get the number of channels with pending entries
    pub fn channel_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if there are any pending entries
    pub fn is_empty(&self) -> bool {
        self.total_count.load(Ordering::SeqCst) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> LogEntry {
        LogEntry::new("alice", text, "general")
    }

    #[test]
    fn test_add_returns_pending_count() {
        let store = EntryStore::new();
        let channel = ChannelKey::new("1");

        assert_eq!(store.add(&channel, entry("a")), 1);
        assert_eq!(store.add(&channel, entry("b")), 2);
        assert_eq!(store.pending_count(&channel), 2);
        assert_eq!(store.total_pending(), 2);
    }

    #[test]
    fn test_drain_preserves_order_and_prunes() {
        let store = EntryStore::new();
        let channel = ChannelKey::new("1");
        for text in ["a", "b", "c"] {
            store.add(&channel, entry(text));
        }

        let drained = store.drain(&channel);
        let texts: Vec<_> = drained.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);

        assert!(store.is_empty());
        assert_eq!(store.channel_count(), 0);
        assert!(store.channels_with_pending().is_empty());
    }

    #[test]
    fn test_drain_unknown_channel_is_empty() {
        let store = EntryStore::new();
        assert!(store.drain(&ChannelKey::new("missing")).is_empty());
        assert_eq!(store.channel_count(), 0);
    }

    #[test]
    fn test_add_after_drain_starts_fresh_sequence() {
        let store = EntryStore::new();
        let channel = ChannelKey::new("1");
        store.add(&channel, entry("a"));

        let in_flight = store.drain(&channel);
        store.add(&channel, entry("b"));

        assert_eq!(in_flight.len(), 1);
        assert_eq!(store.snapshot(&channel)[0].text, "b");
    }

    #[test]
    fn test_requeue_goes_in_front() {
        let store = EntryStore::new();
        let channel = ChannelKey::new("1");
        store.add(&channel, entry("a"));
        store.add(&channel, entry("b"));

        let batch = store.drain(&channel);
        store.add(&channel, entry("c"));
        store.requeue(&channel, batch);

        let texts: Vec<_> = store
            .snapshot(&channel)
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(store.total_pending(), 3);
    }

    #[test]
    fn test_requeue_empty_batch_creates_nothing() {
        let store = EntryStore::new();
        store.requeue(&ChannelKey::new("1"), Vec::new());
        assert_eq!(store.channel_count(), 0);
    }

    #[test]
    fn test_channels_with_pending() {
        let store = EntryStore::new();
        store.add(&ChannelKey::new("x"), entry("1"));
        store.add(&ChannelKey::new("y"), entry("2"));
        store.add(&ChannelKey::new("y"), entry("3"));

        let channels = store.channels_with_pending();
        assert_eq!(channels.len(), 2);
        assert!(channels.contains(&ChannelKey::new("x")));
        assert!(channels.contains(&ChannelKey::new("y")));
    }
}
