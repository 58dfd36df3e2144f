//! Durable merge writer
//!
//! Persists a channel's pending entries by reading the existing log file,
//! appending the drained batch after it and replacing the file atomically
//! (write to a temp file, then rename). A reader never observes a truncated
//! or half-written log.
//!
//! ## Storage Format
//!
//! One file per channel, `channel_<key>.json`, holding a single pretty-printed
//! JSON array of entries:
//! ```text
//! [
//!   {
//!     "user": "alice",
//!     "timestamp": "2024-05-01T12:00:00.000Z",
//!     "content": "hello",
//!     "channel": "general"
//!   }
//! ]
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace, warn};

use crate::buffer::EntryStore;
use crate::entry::{ChannelKey, LogEntry};
use crate::error::StorageError;

/// Configuration for the merge writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Directory holding one log file per channel
    pub base_dir: PathBuf,
    /// Whether to fsync the temp file before it replaces the log
    pub sync_on_write: bool,
    /// Whether to move an unparsable log aside instead of leaving it in place
    pub quarantine_corrupt: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./chatlog-data"),
            sync_on_write: true,
            quarantine_corrupt: true,
        }
    }
}

impl WriterConfig {
    /// Create a configuration rooted at the given directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Set whether writes are synced to disk
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Set whether corrupt logs are quarantined
    pub fn with_quarantine_corrupt(mut self, quarantine: bool) -> Self {
        self.quarantine_corrupt = quarantine;
        self
    }
}

/// What happens to a drained batch when its flush fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequeuePolicy {
    /// Drop the batch; the caller only gets the error
    Never,
    /// Put the batch back in front of the pending entries on I/O errors
    #[default]
    OnIoError,
}

/// Counters describing the writer's activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Flushes that wrote at least one entry
    pub flushes: u64,
    /// Entries persisted across all channels
    pub entries_written: u64,
    /// Flushes that failed
    pub failures: u64,
}

/// Writes pending batches to per-channel log files
///
/// Flushes of the same channel are serialized through a per-channel lock.
/// The drain from the [`EntryStore`] happens after that lock is taken, so
/// batches reach the file in arrival order even when flushes overlap.
/// Appends never wait on this lock.
#[derive(Debug)]
pub struct MergeWriter {
    /// Configuration
    config: WriterConfig,
    /// Per-channel flush locks
    locks: DashMap<ChannelKey, Arc<Mutex<()>>>,
    /// Successful non-empty flushes
    flushes: AtomicU64,
    /// Entries persisted
    entries_written: AtomicU64,
    /// Failed flushes
    failures: AtomicU64,
    /// Entries in each channel's file after its last successful flush
    persisted: DashMap<ChannelKey, usize>,
}

impl MergeWriter {
    /// Create a writer with the given configuration
    pub fn new(config: WriterConfig) -> Self {
        Self {
            config,
            locks: DashMap::new(),
            flushes: AtomicU64::new(0),
            entries_written: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            persisted: DashMap::new(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Directory holding the channel logs
    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    /// Location of a channel's log file
    pub fn log_path(&self, channel: &ChannelKey) -> PathBuf {
        self.config.base_dir.join(channel.file_name())
    }

    /// Snapshot of the activity counters
    pub fn stats(&self) -> WriterStats {
        WriterStats {
            flushes: self.flushes.load(Ordering::SeqCst),
            entries_written: self.entries_written.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
        }
    }

    /// Entries in the channel's file after this writer last flushed it
    pub fn persisted_count(&self, channel: &ChannelKey) -> Option<usize> {
        self.persisted.get(channel).map(|count| *count)
    }

    /// Channels with a flush currently holding their lock
    pub fn channels_in_flight(&self) -> BTreeSet<ChannelKey> {
        self.locks
            .iter()
            .filter(|lock| lock.value().try_lock().is_err())
            .map(|lock| lock.key().clone())
            .collect()
    }

    fn channel_lock(&self, channel: &ChannelKey) -> Arc<Mutex<()>> {
        self.locks.entry(channel.clone()).or_default().clone()
    }

    /// Persist every pending entry of `channel`
    ///
    /// Returns the number of entries newly written. When nothing is pending
    /// this is a no-op that performs no I/O and returns 0.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Io`] on filesystem failure. With
    ///   [`RequeuePolicy::OnIoError`] the batch is put back before returning.
    /// - [`StorageError::Corrupted`] when the existing log is unparsable. The
    ///   log is not overwritten and the batch is not requeued.
    ///
    /// # Cancellation
    ///
    /// Dropping the future after the drain loses the batch, and a blocking
    /// filesystem call already handed to the runtime still completes. To
    /// bound a flush in time, run it in a spawned task and stop waiting on
    /// the handle instead.
    #[instrument(skip(self, store, channel), fields(channel = %channel))]
    pub async fn flush(
        &self,
        store: &EntryStore,
        channel: &ChannelKey,
        requeue: RequeuePolicy,
    ) -> Result<usize, StorageError> {
        let lock = self.channel_lock(channel);
        let _guard = lock.lock().await;
        self.flush_locked(store, channel, requeue).await
    }

    /// Like [`flush`](Self::flush), but returns `None` instead of waiting
    /// when a flush of the same channel is already in flight
    ///
    /// Entries appended meanwhile stay pending for the next flush.
    #[instrument(skip(self, store, channel), fields(channel = %channel))]
    pub async fn try_flush(
        &self,
        store: &EntryStore,
        channel: &ChannelKey,
        requeue: RequeuePolicy,
    ) -> Option<Result<usize, StorageError>> {
        let lock = self.channel_lock(channel);
        let Ok(_guard) = lock.try_lock() else {
            debug!("Flush already in flight, deferring");
            return None;
        };
        Some(self.flush_locked(store, channel, requeue).await)
    }

    /// Drain and persist; the caller holds the channel lock
    async fn flush_locked(
        &self,
        store: &EntryStore,
        channel: &ChannelKey,
        requeue: RequeuePolicy,
    ) -> Result<usize, StorageError> {
        let batch = store.drain(channel);
        if batch.is_empty() {
            trace!("Nothing pending");
            return Ok(0);
        }

        match self.write_batch(channel, &batch).await {
            Ok(total) => {
                let written = batch.len();
                self.persisted.insert(channel.clone(), total);
                self.flushes.fetch_add(1, Ordering::SeqCst);
                self.entries_written
                    .fetch_add(written as u64, Ordering::SeqCst);
                debug!(entries = written, total, "Flushed channel log");
                Ok(written)
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                if requeue == RequeuePolicy::OnIoError && err.is_retryable() {
                    warn!(error = %err, requeued = batch.len(), "Flush failed, batch requeued");
                    store.requeue(channel, batch);
                } else {
                    warn!(error = %err, dropped = batch.len(), "Flush failed, batch dropped");
                }
                Err(err)
            }
        }
    }

    /// Read a channel's persisted log
    ///
    /// A missing or blank file reads as an empty sequence.
    pub async fn read_log(&self, channel: &ChannelKey) -> Result<Vec<LogEntry>, StorageError> {
        load_entries(channel, &self.log_path(channel)).await
    }

    /// Merge `batch` after the existing log and replace the file, returning
    /// the merged length
    async fn write_batch(
        &self,
        channel: &ChannelKey,
        batch: &[LogEntry],
    ) -> Result<usize, StorageError> {
        fs::create_dir_all(&self.config.base_dir)
            .await
            .map_err(|e| StorageError::io(channel, e))?;

        let path = self.log_path(channel);
        let mut merged = self.read_existing(channel, &path).await?;
        let existing = merged.len();
        merged.extend_from_slice(batch);

        let bytes = serde_json::to_vec_pretty(&merged)
            .map_err(|e| StorageError::serialization(channel, e.to_string()))?;

        self.replace_atomically(channel, &path, &bytes).await?;

        trace!(
            path = %path.display(),
            existing,
            appended = batch.len(),
            "Replaced channel log"
        );
        Ok(merged.len())
    }

    /// Load the existing log, quarantining it if it fails to parse
    async fn read_existing(
        &self,
        channel: &ChannelKey,
        path: &Path,
    ) -> Result<Vec<LogEntry>, StorageError> {
        match load_entries(channel, path).await {
            Err(StorageError::Corrupted {
                channel,
                path,
                reason,
                ..
            }) => {
                let quarantined_to = if self.config.quarantine_corrupt {
                    quarantine(&channel, &path).await
                } else {
                    None
                };
                Err(StorageError::Corrupted {
                    channel,
                    path,
                    quarantined_to,
                    reason,
                })
            }
            other => other,
        }
    }

    /// Write `bytes` to a sibling temp file, then rename it over `path`
    async fn replace_atomically(
        &self,
        channel: &ChannelKey,
        path: &Path,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let temp_path = path.with_file_name(format!("{}.tmp", channel.file_name()));

        let result = async {
            let mut file = File::create(&temp_path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            if self.config.sync_on_write {
                file.sync_all().await?;
            }
            drop(file);
            fs::rename(&temp_path, path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::io(channel, e));
        }
        Ok(())
    }
}

/// Parse a channel log file
async fn load_entries(channel: &ChannelKey, path: &Path) -> Result<Vec<LogEntry>, StorageError> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            trace!(path = %path.display(), "No existing log file");
            return Ok(Vec::new());
        }
        Err(e) => return Err(StorageError::io(channel, e)),
    };

    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    serde_json::from_slice(&data).map_err(|e| StorageError::Corrupted {
        channel: channel.clone(),
        path: path.to_path_buf(),
        quarantined_to: None,
        reason: e.to_string(),
    })
}

/// Move a corrupt log aside, returning its new location
async fn quarantine(channel: &ChannelKey, path: &Path) -> Option<PathBuf> {
    let millis = chrono::Utc::now().timestamp_millis();
    let target = path.with_file_name(format!("{}.corrupt-{}", channel.file_name(), millis));

    match fs::rename(path, &target).await {
        Ok(()) => {
            warn!(
                channel = %channel,
                from = %path.display(),
                to = %target.display(),
                "Quarantined corrupt channel log"
            );
            Some(target)
        }
        Err(e) => {
            warn!(channel = %channel, error = %e, "Failed to quarantine corrupt channel log");
            None
        }
    }
}
