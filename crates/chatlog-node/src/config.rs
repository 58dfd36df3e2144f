//! Configuration for the lifecycle coordinator
//!
//! Loadable from TOML:
//!
//! ```toml
//! requeue = "on_io_error"
//! flush_interval_secs = 30
//! shutdown_timeout_secs = 10
//!
//! [writer]
//! base_dir = "/var/lib/chatlog"
//! sync_on_write = true
//! quarantine_corrupt = true
//!
//! [policy]
//! batch_size = 10
//! long_message_chars = 100
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chatlog_storage::{FlushPolicy, RequeuePolicy, WriterConfig};
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, NodeResult};

/// Default bound on the final flush at shutdown, in seconds
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Configuration for a [`ChatLogger`](crate::ChatLogger)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Where and how channel logs are written
    pub writer: WriterConfig,
    /// When a channel is flushed
    pub policy: FlushPolicy,
    /// What happens to a batch whose flush failed
    pub requeue: RequeuePolicy,
    /// Flush every pending channel on this period; disabled when `None`
    #[serde(
        rename = "flush_interval_secs",
        with = "opt_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub flush_interval: Option<Duration>,
    /// Upper bound on the final flush performed by `stop`
    #[serde(rename = "shutdown_timeout_secs", with = "secs")]
    pub shutdown_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            writer: WriterConfig::default(),
            policy: FlushPolicy::default(),
            requeue: RequeuePolicy::default(),
            flush_interval: None,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        }
    }
}

impl NodeConfig {
    /// Create a configuration writing logs under `base_dir`
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            writer: WriterConfig::with_base_dir(base_dir),
            ..Self::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> NodeResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> NodeResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Check values that would otherwise fail at runtime
    pub fn validate(&self) -> NodeResult<()> {
        if self.flush_interval == Some(Duration::ZERO) {
            return Err(NodeError::Config(
                "flush_interval_secs must be greater than zero".into(),
            ));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(NodeError::Config(
                "shutdown_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Set the writer configuration
    pub fn with_writer(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }

    /// Set the flush policy
    pub fn with_policy(mut self, policy: FlushPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the requeue policy
    pub fn with_requeue(mut self, requeue: RequeuePolicy) -> Self {
        self.requeue = requeue;
        self
    }

    /// Enable periodic flushing
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    /// Set the shutdown flush bound
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
    }
}
