//! Error types for the lifecycle coordinator

use thiserror::Error;

use crate::LifecycleState;

/// Errors that can occur in the lifecycle coordinator
#[derive(Debug, Error)]
pub enum NodeError {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] chatlog_storage::StorageError),

    /// Logger already started
    #[error("Logger already started")]
    AlreadyStarted,

    /// Operation not valid in the current lifecycle state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// What was attempted
        operation: &'static str,
        /// State the logger was in
        state: LifecycleState,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl From<toml::de::Error> for NodeError {
    fn from(e: toml::de::Error) -> Self {
        NodeError::Config(e.to_string())
    }
}

/// Result type alias for coordinator operations
pub type NodeResult<T> = Result<T, NodeError>;
