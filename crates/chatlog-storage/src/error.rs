//! Error types for chatlog-storage
//!
//! This module defines the error types used throughout the storage crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::entry::ChannelKey;

/// Errors that can occur while persisting channel logs
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure while reading or writing a channel's log
    #[error("I/O error for channel {channel}: {source}")]
    Io {
        /// Channel whose flush failed
        channel: ChannelKey,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// The existing log file could not be parsed as a sequence of entries
    #[error("Corrupted log for channel {channel} at {}: {reason}", path.display())]
    Corrupted {
        /// Channel whose log is unreadable
        channel: ChannelKey,
        /// Location of the log file that failed to parse
        path: PathBuf,
        /// Where the corrupt file was moved, if it was quarantined
        quarantined_to: Option<PathBuf>,
        /// Parser message
        reason: String,
    },

    /// Error during serialization
    #[error("Serialization error for channel {channel}: {message}")]
    Serialization {
        /// Channel being serialized
        channel: ChannelKey,
        /// Serializer message
        message: String,
    },

    /// The deadline passed before the channel's flush finished
    ///
    /// A flush that already started keeps running and either lands or puts
    /// its batch back; a channel never reached keeps its pending entries.
    #[error("Flush of channel {0} did not finish before the deadline")]
    Timeout(ChannelKey),
}

impl StorageError {
    /// Create a new I/O error for a channel
    pub fn io(channel: &ChannelKey, source: std::io::Error) -> Self {
        Self::Io {
            channel: channel.clone(),
            source,
        }
    }

    /// Create a new Serialization error
    pub fn serialization(channel: &ChannelKey, message: impl Into<String>) -> Self {
        Self::Serialization {
            channel: channel.clone(),
            message: message.into(),
        }
    }

    /// The channel this error belongs to
    pub fn channel(&self) -> &ChannelKey {
        match self {
            Self::Io { channel, .. }
            | Self::Corrupted { channel, .. }
            | Self::Serialization { channel, .. } => channel,
            Self::Timeout(channel) => channel,
        }
    }

    /// Whether the failed batch may be put back and retried later
    ///
    /// Only I/O failures qualify. Corrupted logs are never retried, and a
    /// timed-out batch is still owned by its in-flight flush.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Whether this error reports an unreadable log file
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_carries_channel() {
        let channel = ChannelKey::new("42");
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StorageError::io(&channel, io_err);
        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(err.channel(), &channel);
        assert!(err.to_string().contains("42"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_corruption_is_not_retryable() {
        let err = StorageError::Corrupted {
            channel: ChannelKey::new("7"),
            path: PathBuf::from("/tmp/channel_7.json"),
            quarantined_to: None,
            reason: "expected value".into(),
        };
        assert!(err.is_corruption());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("channel_7.json"));
    }

    #[test]
    fn test_serialization_error() {
        let err = StorageError::serialization(&ChannelKey::new("1"), "invalid format");
        assert!(matches!(err, StorageError::Serialization { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_error() {
        let err = StorageError::Timeout(ChannelKey::new("9"));
        assert_eq!(err.channel().as_str(), "9");
        assert!(!err.is_retryable());
    }
}
