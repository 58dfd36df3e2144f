//! # Chatlog Storage
//!
//! Buffered, crash-safe, append-only per-channel log storage.
//!
//! This crate holds observed chat messages in memory and persists them in
//! batches to one JSON file per channel, merging each batch after the
//! file's existing content.
//!
//! ## Features
//!
//! - **EntryStore**: pending entries per channel, in arrival order
//! - **FlushPolicy**: pure "flush now?" decision (batch size or long message)
//! - **MergeWriter**: read-merge-replace writer with atomic file replacement
//!   and per-channel flush serialization
//! - **StorageError**: I/O and corruption errors carrying the channel key
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatlog_storage::{ChannelKey, EntryStore, FlushPolicy, LogEntry, MergeWriter, RequeuePolicy, WriterConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = EntryStore::new();
//!     let writer = MergeWriter::new(WriterConfig::with_base_dir("./logs"));
//!     let policy = FlushPolicy::default();
//!     let channel = ChannelKey::new("1234");
//!
//!     let entry = LogEntry::new("alice", "hello", "general");
//!     let pending = store.add(&channel, entry.clone());
//!
//!     if policy.should_flush(pending, &entry) {
//!         writer.flush(&store, &channel, RequeuePolicy::OnIoError).await.unwrap();
//!     }
//! }
//! ```

pub mod buffer;
pub mod entry;
pub mod error;
pub mod policy;
pub mod writer;

// Re-exports
pub use buffer::EntryStore;
pub use entry::{ChannelKey, LogEntry, format_timestamp};
pub use error::StorageError;
pub use policy::{DEFAULT_BATCH_SIZE, DEFAULT_LONG_MESSAGE_CHARS, FlushPolicy, FlushTrigger};
pub use writer::{MergeWriter, RequeuePolicy, WriterConfig, WriterStats};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_policy_driven_flush() {
        let dir = TempDir::new().unwrap();
        let store = EntryStore::new();
        let writer = MergeWriter::new(WriterConfig::with_base_dir(dir.path()));
        let policy = FlushPolicy::default();
        let channel = ChannelKey::new("1");

        let mut flushes = 0;
        for i in 0..25 {
            let entry = LogEntry::new("alice", format!("message {i}"), "general");
            let pending = store.add(&channel, entry.clone());
            if policy.should_flush(pending, &entry) {
                writer
                    .flush(&store, &channel, RequeuePolicy::OnIoError)
                    .await
                    .unwrap();
                flushes += 1;
            }
        }

        assert_eq!(flushes, 2);
        assert_eq!(store.pending_count(&channel), 5);
        assert_eq!(writer.read_log(&channel).await.unwrap().len(), 20);
    }
}
