//! Diagnostic logging setup for chatlog
//!
//! Builds the global `tracing` subscriber used by the chatlog binary:
//! console output (pretty or JSON) plus optional rolling JSON files.
//!
//! This is the process's own diagnostic log. It is unrelated to the channel
//! logs that `chatlog-storage` writes.
//!
//! # Quick Start
//!
//! ```ignore
//! use chatlog_logging::{ChatlogSubscriberBuilder, FileConfig};
//!
//! // JSON lines on stderr at info level
//! let _guard = ChatlogSubscriberBuilder::new().init();
//!
//! // Pretty stderr output plus daily files under ./diag
//! let _guard = ChatlogSubscriberBuilder::new()
//!     .with_level("debug")
//!     .with_pretty_console(true)
//!     .with_file_output(FileConfig::in_directory("./diag"))
//!     .init();
//! ```

pub mod config;

pub use config::{ConsoleConfig, FileConfig, JsonConfig, LogConfig, RotationStrategy};

use thiserror::Error;
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file appender could not be created
    #[error("Failed to create log file appender: {0}")]
    Appender(#[from] InitError),

    /// A global subscriber was already installed
    #[error("Failed to install subscriber: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Builder for configuring and initializing the chatlog logging subscriber
pub struct ChatlogSubscriberBuilder {
    config: LogConfig,
}

impl ChatlogSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    ///
    /// Default: JSON console output at info level
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Choose pretty or JSON console output
    pub fn with_pretty_console(mut self, pretty: bool) -> Self {
        self.config.console.pretty = pretty;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Get the configuration that will be installed
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Initialize the subscriber globally
    ///
    /// Returns the file writer guard, which must be kept alive for the
    /// duration of the program. Failures are printed to stderr and leave
    /// the process without a subscriber.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: Failed to initialize logging: {}", e);
                None
            }
        }
    }

    /// Try to initialize the subscriber globally
    ///
    /// Returns an error if the file appender cannot be created or a global
    /// subscriber has already been set.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.level));

        let file_writer = match &self.config.file {
            Some(file_config) => Some(create_file_writer(file_config)?),
            None => None,
        };

        let registry = Registry::default().with(env_filter);
        let console = &self.config.console;
        let json = &self.config.json;

        let guard = match (console.enabled, console.pretty, file_writer) {
            // Pretty console + File
            (true, true, Some((writer, guard))) => {
                registry
                    .with(pretty_layer(console.ansi))
                    .with(json_layer(json, writer))
                    .try_init()?;
                Some(guard)
            }

            // JSON console + File
            (true, false, Some((writer, guard))) => {
                registry
                    .with(json_layer(json, std::io::stderr))
                    .with(json_layer(json, writer))
                    .try_init()?;
                Some(guard)
            }

            // Pretty console only
            (true, true, None) => {
                registry.with(pretty_layer(console.ansi)).try_init()?;
                None
            }

            // JSON console only (default)
            (true, false, None) => {
                registry.with(json_layer(json, std::io::stderr)).try_init()?;
                None
            }

            // File only (no console)
            (false, _, Some((writer, guard))) => {
                registry.with(json_layer(json, writer)).try_init()?;
                Some(guard)
            }

            // Nothing enabled - just base registry
            (false, _, None) => {
                registry.try_init()?;
                None
            }
        };

        Ok(guard)
    }
}

impl Default for ChatlogSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Human-readable console layer on stderr
fn pretty_layer<S>(ansi: bool) -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(ansi)
        .with_target(true)
        .with_writer(std::io::stderr)
}

/// JSON lines layer writing to `writer`
fn json_layer<S, W>(config: &JsonConfig, writer: W) -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_writer(writer)
}

/// Create the non-blocking file writer for the configured rotation
fn create_file_writer(file_config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), InitError> {
    let (rotation, prefix) = match file_config.rotation {
        RotationStrategy::Daily => (Rotation::DAILY, file_config.prefix.clone()),
        RotationStrategy::Hourly => (Rotation::HOURLY, file_config.prefix.clone()),
        RotationStrategy::Never => (Rotation::NEVER, format!("{}.log", file_config.prefix)),
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix)
        .build(&file_config.directory)?;

    Ok(tracing_appender::non_blocking(appender))
}
