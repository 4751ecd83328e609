//! Cluster node discovery via kubectl label and pod queries.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::RemoteError;
use crate::Result;

/// Capability to look up node addresses in the cluster.
#[async_trait]
pub trait ClusterDiscovery: Send + Sync {
    /// Internal IPs of all nodes carrying the `nodetype=<node_type>` label.
    async fn nodes_with_label(&self, node_type: &str) -> Result<Vec<String>>;

    /// Host IP of the first pod in `namespace` whose name starts with `<pod_prefix>-`.
    async fn pod_host(&self, namespace: &str, pod_prefix: &str) -> Result<String>;
}

/// Discovery backed by the local `kubectl`.
#[derive(Debug, Clone, Default)]
pub struct KubectlDiscovery;

impl KubectlDiscovery {
    pub fn new() -> Self {
        Self
    }
}

async fn shell(script: &str) -> Result<String> {
    let output = Command::new("sh").arg("-c").arg(script).output().await?;
    if !output.status.success() {
        return Err(RemoteError::Discovery(format!(
            "`{}` failed: {}",
            script,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Split command output into trimmed, non-empty lines.
pub(crate) fn parse_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl ClusterDiscovery for KubectlDiscovery {
    async fn nodes_with_label(&self, node_type: &str) -> Result<Vec<String>> {
        let script = format!(
            "kubectl get nodes --show-labels --no-headers -o wide | grep nodetype={} | awk '{{print $6}}'",
            node_type
        );
        let nodes = parse_lines(&shell(&script).await?);
        debug!(node_type = %node_type, count = nodes.len(), "Discovered nodes");
        Ok(nodes)
    }

    async fn pod_host(&self, namespace: &str, pod_prefix: &str) -> Result<String> {
        let pods = shell(&format!(
            "kubectl get pods -n {} --no-headers | grep {}- | awk '{{print $1}}'",
            namespace, pod_prefix
        ))
        .await?;
        let pod = parse_lines(&pods).into_iter().next().ok_or_else(|| {
            RemoteError::Discovery(format!("no {} pod in namespace {}", pod_prefix, namespace))
        })?;

        let host = shell(&format!(
            "kubectl get pod {} -n {} -o=jsonpath='{{.status.hostIP}}'",
            pod, namespace
        ))
        .await?;
        parse_lines(&host)
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Discovery(format!("pod {} has no host IP", pod)))
    }
}
