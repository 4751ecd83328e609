//! Error taxonomy for the multi-loader.
//!
//! Configuration and reachability errors abort the whole run. Execution
//! errors are retried and then abort only the remainder of the current
//! study. Metric collection errors are logged where they happen; the
//! `MetricCollection` variant is reserved for a broken local output tree.

use multiloader_remote::RemoteError;

/// Failure of a single engine attempt.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to spawn loader: {0}")]
    Spawn(std::io::Error),

    #[error("loader exited with status {code}")]
    NonZeroExit { code: i32 },

    #[error("loader exceeded the {limit_secs}s deadline and was killed")]
    TimedOut { limit_secs: u64 },

    #[error("loader output capture failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Multi-loader errors.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("node {node} is unreachable: {reason}")]
    NodeUnreachable { node: String, reason: String },

    #[error("experiment execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("metric collection failed: {0}")]
    MetricCollection(String),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    /// Shorthand for [`LoaderError::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        LoaderError::Configuration(msg.into())
    }

    /// Whether this error must stop the whole orchestrator run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LoaderError::Execution(_))
    }
}

/// Result type for multi-loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;
