//! Multiloader-Remote: cluster access for the multi-loader
//!
//! This crate is the only place that shells out to `ssh`, `scp` and
//! `kubectl`. Everything above it talks to the [`RemoteExecutor`] and
//! [`ClusterDiscovery`] traits so tests can swap in the in-memory
//! [`fakes`].

pub mod discovery;
pub mod error;
pub mod executor;
pub mod fakes;

pub use discovery::{ClusterDiscovery, KubectlDiscovery};
pub use error::RemoteError;
pub use executor::{is_valid_ip, RemoteExecutor, SshConfig, SshExecutor};

/// Result type for remote operations
pub type Result<T> = std::result::Result<T, RemoteError>;
