//! Error types for multiloader-remote

use thiserror::Error;

/// Errors that can occur while talking to cluster nodes
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Node identifier is not a valid IP address
    #[error("Invalid IP address for node: {0}")]
    InvalidAddress(String),

    /// Node failed the connectivity probe
    #[error("Failed to connect to node {node}: {reason}")]
    Unreachable { node: String, reason: String },

    /// Remote command exited non-zero
    #[error("Remote command `{command}` failed on {node} (status {status}): {output}")]
    CommandFailed {
        node: String,
        command: String,
        status: i32,
        output: String,
    },

    /// Remote copy failed
    #[error("Copy of {src} from {node} failed: {reason}")]
    CopyFailed {
        node: String,
        src: String,
        reason: String,
    },

    /// Cluster query returned nothing usable
    #[error("Cluster discovery failed: {0}")]
    Discovery(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
