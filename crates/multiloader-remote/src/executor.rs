//! Remote command execution over SSH.
//!
//! [`RemoteExecutor`] is the capability the metric collector and the node
//! resolver depend on. [`SshExecutor`] implements it with the system `ssh`
//! and `scp` binaries.

use std::net::IpAddr;
use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::RemoteError;
use crate::Result;

/// Capability to run commands on, and copy files from, cluster nodes.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a shell command on `node` and return its combined output.
    async fn run(&self, node: &str, command: &str) -> Result<String>;

    /// Copy `remote_src` (may be a directory or a glob) from `node` into `local_dst`.
    async fn copy(&self, node: &str, remote_src: &str, local_dst: &Path) -> Result<()>;

    /// Check that `node` accepts a remote shell.
    async fn probe(&self, node: &str) -> Result<()>;
}

/// Whether `node` parses as an IPv4 or IPv6 address.
pub fn is_valid_ip(node: &str) -> bool {
    node.trim().parse::<IpAddr>().is_ok()
}

/// Connection options shared by every `ssh`/`scp` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    /// Port passed with `-p` / `-P`.
    pub port: u16,
    /// Disable host key prompts (`-oStrictHostKeyChecking=no`).
    pub accept_new_hosts: bool,
    /// Login user; when unset the ssh client default applies.
    pub user: Option<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            port: 22,
            accept_new_hosts: true,
            user: None,
        }
    }
}

/// `ssh`/`scp` backed executor.
#[derive(Debug, Clone, Default)]
pub struct SshExecutor {
    config: SshConfig,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn destination(&self, node: &str) -> String {
        match &self.config.user {
            Some(user) => format!("{}@{}", user, node.trim()),
            None => node.trim().to_string(),
        }
    }

    fn host_key_args(&self) -> Vec<String> {
        if self.config.accept_new_hosts {
            vec!["-oStrictHostKeyChecking=no".to_string()]
        } else {
            Vec::new()
        }
    }

    fn ssh_command(&self, node: &str, command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(self.host_key_args())
            .arg("-p")
            .arg(self.config.port.to_string())
            .arg(self.destination(node))
            .arg(command);
        cmd
    }
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, node: &str, command: &str) -> Result<String> {
        trace!(node = %node, command = %command, "Running remote command");
        let output = self.ssh_command(node, command).output().await?;
        let text = combined_output(&output);

        if !output.status.success() {
            return Err(RemoteError::CommandFailed {
                node: node.to_string(),
                command: command.to_string(),
                status: output.status.code().unwrap_or(-1),
                output: text.trim().to_string(),
            });
        }
        Ok(text)
    }

    async fn copy(&self, node: &str, remote_src: &str, local_dst: &Path) -> Result<()> {
        debug!(node = %node, src = %remote_src, dst = %local_dst.display(), "Copying remote file");
        let output = Command::new("scp")
            .args(self.host_key_args())
            .arg("-r")
            .arg("-P")
            .arg(self.config.port.to_string())
            .arg(format!("{}:{}", self.destination(node), remote_src))
            .arg(local_dst)
            .output()
            .await?;

        if !output.status.success() {
            return Err(RemoteError::CopyFailed {
                node: node.to_string(),
                src: remote_src.to_string(),
                reason: combined_output(&output).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn probe(&self, node: &str) -> Result<()> {
        if !is_valid_ip(node) {
            return Err(RemoteError::InvalidAddress(node.to_string()));
        }

        let output = self.ssh_command(node, "exit").output().await?;
        let text = combined_output(&output);
        if text.contains("Permission denied") || !output.status.success() {
            return Err(RemoteError::Unreachable {
                node: node.to_string(),
                reason: text.trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_ip() {
        assert!(is_valid_ip("10.0.1.1"));
        assert!(is_valid_ip(" 192.168.0.7 "));
        assert!(is_valid_ip("::1"));
        assert!(!is_valid_ip("node-1"));
        assert!(!is_valid_ip(""));
    }

    #[test]
    fn test_ssh_config_default() {
        let config = SshConfig::default();
        assert_eq!(config.port, 22);
        assert!(config.accept_new_hosts);
        assert!(config.user.is_none());
    }

    #[test]
    fn test_destination_with_user() {
        let executor = SshExecutor::new(SshConfig {
            user: Some("bench".to_string()),
            ..SshConfig::default()
        });
        assert_eq!(executor.destination(" 10.0.0.3\n"), "bench@10.0.0.3");
    }

    #[test]
    fn test_destination_without_user() {
        let executor = SshExecutor::default();
        assert_eq!(executor.destination("10.0.0.3"), "10.0.0.3");
    }

    #[tokio::test]
    async fn test_probe_rejects_invalid_address() {
        let executor = SshExecutor::default();
        let err = executor.probe("not-an-ip").await.unwrap_err();
        assert!(matches!(err, RemoteError::InvalidAddress(_)));
    }
}
