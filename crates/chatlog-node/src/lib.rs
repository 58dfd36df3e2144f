//! # Chatlog Node
//!
//! Lifecycle coordinator for the chat logger.
//!
//! This crate provides [`ChatLogger`], which ties together:
//! - the pending [`EntryStore`]
//! - the [`FlushPolicy`] evaluated after every append
//! - the [`MergeWriter`] that persists batches to per-channel files
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatlog_node::{ChatEvent, ChatLogger, NodeConfig};
//!
//! let logger = ChatLogger::new(NodeConfig::with_base_dir("./logs"))?;
//! logger.start().await?;
//!
//! logger.append(ChatEvent::new("1234", "general", "alice", "hello")).await;
//!
//! // Flushes every channel with pending entries
//! let report = logger.stop().await?;
//! println!("saved {} entries", report.total_written());
//! ```

mod config;
mod error;
pub mod event;
pub mod status;

pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use event::{AppendOutcome, ChatEvent, FlushReport};
pub use status::{CollectingStatus, StatusSink, TracingStatus};

pub use chatlog_storage::{
    ChannelKey, EntryStore, FlushPolicy, FlushTrigger, LogEntry, MergeWriter, RequeuePolicy,
    StorageError, WriterConfig,
};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// Lifecycle of a [`ChatLogger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Not accepting messages
    Stopped = 0,
    /// Accepting messages
    Running = 1,
    /// Performing the final flush
    Stopping = 2,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// State shared with the periodic flush task
struct Inner {
    config: NodeConfig,
    store: EntryStore,
    writer: MergeWriter,
    status: Arc<dyn StatusSink>,
    state: AtomicU8,
}

impl Inner {
    fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), LifecycleState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(LifecycleState::from_u8)
    }

    /// Send a flush result to the status hook
    fn report_flush(&self, channel: &ChannelKey, result: &Result<usize, StorageError>) {
        match result {
            Ok(0) => {}
            Ok(written) => {
                let total = self.writer.persisted_count(channel).unwrap_or(*written);
                self.status.report(&format!(
                    "Logs for channel {} saved ({} new entries, {} total)",
                    channel, written, total
                ));
            }
            Err(e) => {
                error!(channel = %channel, error = %e, "Failed to save channel log");
                self.status
                    .report(&format!("Failed to save logs for channel {}: {}", channel, e));
            }
        }
    }

    /// Flush one channel, waiting for any in-flight flush of it
    async fn flush_channel(&self, channel: &ChannelKey) -> Result<usize, StorageError> {
        let result = self
            .writer
            .flush(&self.store, channel, self.config.requeue)
            .await;
        self.report_flush(channel, &result);
        result
    }

    /// Flush one channel in its own task
    ///
    /// Dropping the handle detaches the flush instead of cancelling it, so a
    /// caller that stops waiting never strands a drained batch.
    fn spawn_flush(self: &Arc<Self>, channel: ChannelKey) -> JoinHandle<Result<usize, StorageError>> {
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.flush_channel(&channel).await })
    }

    /// Flush every channel with pending entries before `deadline`
    ///
    /// Never short-circuits: a failing channel does not stop the others.
    /// A channel whose flush is still running at the deadline, or that was
    /// never reached, is reported as timed out.
    async fn flush_all(self: &Arc<Self>, deadline: Instant) -> FlushReport {
        let mut report = FlushReport::new();

        // A flush left running by an earlier pass is unfinished work too
        let mut channels = self.store.channels_with_pending();
        channels.extend(self.writer.channels_in_flight());
        let mut channels = channels.into_iter();

        while let Some(channel) = channels.next() {
            let task = self.spawn_flush(channel.clone());
            match tokio::time::timeout_at(deadline, task).await {
                Ok(Ok(result)) => {
                    report.insert(channel, result);
                }
                Ok(Err(e)) => {
                    error!(channel = %channel, error = %e, "Flush task failed");
                    let err = StorageError::io(&channel, std::io::Error::other(e));
                    self.status
                        .report(&format!("Failed to save logs for channel {}: {}", channel, err));
                    report.insert(channel, Err(err));
                }
                Err(_) => {
                    warn!(channel = %channel, "Flush deadline passed");
                    for channel in std::iter::once(channel).chain(channels.by_ref()) {
                        let err = StorageError::Timeout(channel.clone());
                        self.status.report(&format!(
                            "Failed to save logs for channel {}: {}",
                            channel, err
                        ));
                        report.insert(channel, Err(err));
                    }
                    break;
                }
            }
        }

        report
    }
}

/// Buffers observed chat messages and persists them per channel
///
/// Messages are only accepted while the logger is running. `stop` performs
/// a final, time-bounded flush of every channel.
pub struct ChatLogger {
    /// Shared state
    inner: Arc<Inner>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    /// Periodic flush task, when enabled and running
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl ChatLogger {
    /// Create a stopped logger that reports status through `tracing`
    pub fn new(config: NodeConfig) -> NodeResult<Self> {
        Self::with_status(config, Arc::new(TracingStatus))
    }

    /// Create a stopped logger with a custom status sink
    pub fn with_status(config: NodeConfig, status: Arc<dyn StatusSink>) -> NodeResult<Self> {
        config.validate()?;

        let writer = MergeWriter::new(config.writer.clone());
        let (shutdown_tx, _) = broadcast::channel(1);

        debug!(base_dir = %config.writer.base_dir.display(), "Chat logger created");

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store: EntryStore::new(),
                writer,
                status,
                state: AtomicU8::new(LifecycleState::Stopped as u8),
            }),
            shutdown_tx,
            ticker: Mutex::new(None),
        })
    }

    /// Start accepting messages
    ///
    /// Creates the log directory and, when configured, spawns the periodic
    /// flush task.
    #[instrument(skip(self))]
    pub async fn start(&self) -> NodeResult<()> {
        if let Err(state) = self
            .inner
            .transition(LifecycleState::Stopped, LifecycleState::Running)
        {
            return Err(match state {
                LifecycleState::Running => NodeError::AlreadyStarted,
                state => NodeError::InvalidState {
                    operation: "start",
                    state,
                },
            });
        }

        let base_dir = self.inner.writer.base_dir();
        if let Err(e) = tokio::fs::create_dir_all(base_dir).await {
            self.inner.set_state(LifecycleState::Stopped);
            return Err(NodeError::Io(format!("{}: {}", base_dir.display(), e)));
        }

        if let Some(period) = self.inner.config.flush_interval {
            let task = spawn_periodic_flush(
                Arc::clone(&self.inner),
                period,
                self.shutdown_tx.subscribe(),
            );
            *self.ticker.lock() = Some(task);
        }

        info!(base_dir = %base_dir.display(), "Chat logger started");
        self.inner.status.report("ChatLogger started");
        Ok(())
    }

    /// Stop accepting messages and flush every pending channel
    ///
    /// The final flush is bounded by the configured shutdown timeout.
    /// Stopping a logger that is not running returns an empty report.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> NodeResult<FlushReport> {
        match self
            .inner
            .transition(LifecycleState::Running, LifecycleState::Stopping)
        {
            Ok(()) => {}
            Err(LifecycleState::Stopped) => return Ok(FlushReport::new()),
            Err(state) => {
                return Err(NodeError::InvalidState {
                    operation: "stop",
                    state,
                });
            }
        }

        // The whole shutdown, ticker included, shares one deadline
        let deadline = Instant::now() + self.inner.config.shutdown_timeout;
        let _ = self.shutdown_tx.send(());

        let ticker = self.ticker.lock().take();
        if let Some(mut task) = ticker {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Periodic flush task ended abnormally"),
                Err(_) => {
                    warn!("Periodic flush still busy at the shutdown deadline");
                    task.abort();
                }
            }
        }

        let report = self.inner.flush_all(deadline).await;
        self.inner.set_state(LifecycleState::Stopped);

        let failed = report.failures().count();
        info!(
            channels = report.len(),
            written = report.total_written(),
            failed,
            "Chat logger stopped"
        );
        self.inner.status.report(&format!(
            "ChatLogger stopped: {} entries saved across {} channels, {} failed",
            report.total_written(),
            report.len(),
            failed
        ));

        Ok(report)
    }

    /// Record a message from the host
    ///
    /// Never fails: flush errors and messages received while not running are
    /// reported through the status hook and reflected in the outcome.
    pub async fn append(&self, event: ChatEvent) -> AppendOutcome {
        let (channel, entry) = event.into_entry(Utc::now());
        self.append_entry(&channel, entry).await
    }

    /// Record a pre-built entry for `channel`
    pub async fn append_entry(&self, channel: &ChannelKey, entry: LogEntry) -> AppendOutcome {
        let state = self.inner.state();
        if state != LifecycleState::Running {
            warn!(channel = %channel, %state, "Message dropped, logger is not running");
            self.inner.status.report(&format!(
                "Dropped message for channel {}: logger is {}",
                channel, state
            ));
            return AppendOutcome::Rejected;
        }

        let trigger = self.inner.config.policy.trigger(
            self.inner.store.add(channel, entry.clone()),
            &entry,
        );
        let Some(trigger) = trigger else {
            return AppendOutcome::Buffered {
                pending: self.inner.store.pending_count(channel),
            };
        };

        debug!(channel = %channel, ?trigger, "Flush triggered");
        let attempt = self
            .inner
            .writer
            .try_flush(&self.inner.store, channel, self.inner.config.requeue)
            .await;

        match attempt {
            None => AppendOutcome::Deferred {
                pending: self.inner.store.pending_count(channel),
            },
            Some(result) => {
                self.inner.report_flush(channel, &result);
                match result {
                    Ok(written) => AppendOutcome::Flushed { written, trigger },
                    Err(_) => AppendOutcome::FlushFailed,
                }
            }
        }
    }

    /// Flush one channel now, in any state
    pub async fn flush_channel(&self, channel: &ChannelKey) -> Result<usize, StorageError> {
        self.inner.flush_channel(channel).await
    }

    /// Flush every channel with pending entries, bounded by the shutdown
    /// timeout, without changing state
    ///
    /// A flush still running at the deadline is not cancelled; it finishes
    /// in the background and either lands or puts its batch back.
    pub async fn flush_all(&self) -> FlushReport {
        let deadline = Instant::now() + self.inner.config.shutdown_timeout;
        self.inner.flush_all(deadline).await
    }

    /// Read a channel's persisted log
    pub async fn read_log(&self, channel: &ChannelKey) -> Result<Vec<LogEntry>, StorageError> {
        self.inner.writer.read_log(channel).await
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    /// Check if the logger is accepting messages
    pub fn is_running(&self) -> bool {
        self.inner.state() == LifecycleState::Running
    }

    /// Pending entries for a channel
    pub fn pending_count(&self, channel: &ChannelKey) -> usize {
        self.inner.store.pending_count(channel)
    }

    /// Pending entries across all channels
    pub fn total_pending(&self) -> usize {
        self.inner.store.total_pending()
    }

    /// The pending entry store
    pub fn store(&self) -> &EntryStore {
        &self.inner.store
    }

    /// The merge writer
    pub fn writer(&self) -> &MergeWriter {
        &self.inner.writer
    }

    /// The configuration
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }
}

impl Drop for ChatLogger {
    fn drop(&mut self) {
        let pending = self.inner.store.total_pending();
        if pending > 0 {
            warn!(pending, "Chat logger dropped with unsaved entries; call stop() first");
        }
        if let Some(task) = self.ticker.get_mut().take() {
            task.abort();
        }
    }
}

/// Spawn the task that flushes pending channels once per `period`
fn spawn_periodic_flush(
    inner: Arc<Inner>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = interval.tick() => {
                    let channels = inner.store.channels_with_pending();
                    if channels.is_empty() {
                        continue;
                    }
                    debug!(channels = channels.len(), "Periodic flush");
                    for channel in channels {
                        let _ = inner.spawn_flush(channel).await;
                    }
                }
            }
        }
    })
}
