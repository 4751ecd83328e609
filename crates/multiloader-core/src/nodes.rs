//! Resolution and reachability checks of the cluster node group.

use std::sync::Arc;

use futures::future::join_all;
use multiloader_remote::{is_valid_ip, ClusterDiscovery, RemoteExecutor};
use tracing::{debug, info};

use crate::domain::{MultiLoaderConfig, NodeGroup};
use crate::error::{LoaderError, Result};

/// Namespace holding the autoscaler and activator pods.
pub const KNATIVE_NAMESPACE: &str = "knative-serving";

pub struct NodeGroupResolver {
    discovery: Arc<dyn ClusterDiscovery>,
    executor: Arc<dyn RemoteExecutor>,
}

impl NodeGroupResolver {
    pub fn new(discovery: Arc<dyn ClusterDiscovery>, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            discovery,
            executor,
        }
    }

    /// Take nodes from `config`, querying the cluster for any left blank.
    pub async fn resolve(&self, config: &MultiLoaderConfig) -> Result<NodeGroup> {
        let mut group = NodeGroup {
            master_node: config.master_node.trim().to_string(),
            auto_scaler_node: config.auto_scaler_node.trim().to_string(),
            activator_node: config.activator_node.trim().to_string(),
            loader_node: config.loader_node.trim().to_string(),
            worker_nodes: config
                .worker_nodes
                .iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect(),
        };

        if group.worker_nodes.is_empty() {
            group.worker_nodes = self.discovery.nodes_with_label("worker").await?;
        }
        if group.master_node.is_empty() {
            group.master_node = self.first_with_label("master").await?;
        }
        if group.loader_node.is_empty() {
            group.loader_node = self.first_with_label("monitoring").await?;
        }
        if group.auto_scaler_node.is_empty() {
            group.auto_scaler_node = self.discovery.pod_host(KNATIVE_NAMESPACE, "autoscaler").await?;
        }
        if group.activator_node.is_empty() {
            group.activator_node = self.discovery.pod_host(KNATIVE_NAMESPACE, "activator").await?;
        }

        debug!(nodes = ?group, "Resolved node group");
        Ok(group)
    }

    async fn first_with_label(&self, node_type: &str) -> Result<String> {
        self.discovery
            .nodes_with_label(node_type)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LoaderError::config(format!("no node labelled nodetype={}", node_type)))
    }

    /// Check every role is an IP address answering the SSH probe.
    pub async fn validate(&self, group: &NodeGroup) -> Result<()> {
        let roles = [
            ("master", &group.master_node),
            ("autoscaler", &group.auto_scaler_node),
            ("activator", &group.activator_node),
            ("loader", &group.loader_node),
        ];
        for (role, node) in roles {
            if node.is_empty() {
                return Err(LoaderError::NodeUnreachable {
                    node: role.to_string(),
                    reason: "no address configured or discovered".to_string(),
                });
            }
        }
        if group.worker_nodes.is_empty() {
            return Err(LoaderError::config("no worker nodes configured or discovered"));
        }

        let nodes = group.top_nodes();
        if let Some(bad) = nodes.iter().find(|n| !is_valid_ip(n)) {
            return Err(LoaderError::NodeUnreachable {
                node: bad.clone(),
                reason: "not a valid IP address".to_string(),
            });
        }

        let probes = nodes.iter().map(|node| async move {
            self.executor
                .probe(node)
                .await
                .map_err(|e| LoaderError::NodeUnreachable {
                    node: node.clone(),
                    reason: e.to_string(),
                })
        });
        for result in join_all(probes).await {
            result?;
        }

        info!(count = nodes.len(), "Nodes are reachable");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiloader_remote::fakes::{RecordingExecutor, RemoteCall, StaticDiscovery};

    fn discovery() -> StaticDiscovery {
        StaticDiscovery::new()
            .with_label("worker", &["10.0.0.4", "10.0.0.5"])
            .with_label("master", &["10.0.0.1"])
            .with_label("monitoring", &["10.0.0.3"])
            .with_pod("autoscaler", "10.0.0.1")
            .with_pod("activator", "10.0.0.2")
    }

    #[tokio::test]
    async fn test_resolve_from_cluster() {
        let resolver = NodeGroupResolver::new(
            Arc::new(discovery()),
            Arc::new(RecordingExecutor::new()),
        );
        let group = resolver.resolve(&MultiLoaderConfig::default()).await.unwrap();

        assert_eq!(group.master_node, "10.0.0.1");
        assert_eq!(group.auto_scaler_node, "10.0.0.1");
        assert_eq!(group.activator_node, "10.0.0.2");
        assert_eq!(group.loader_node, "10.0.0.3");
        assert_eq!(group.worker_nodes, vec!["10.0.0.4", "10.0.0.5"]);
    }

    #[tokio::test]
    async fn test_configured_nodes_skip_discovery() {
        let disco = Arc::new(StaticDiscovery::new());
        let resolver = NodeGroupResolver::new(disco.clone(), Arc::new(RecordingExecutor::new()));
        let config = MultiLoaderConfig {
            master_node: "10.1.0.1".to_string(),
            auto_scaler_node: "10.1.0.1".to_string(),
            activator_node: "10.1.0.1".to_string(),
            loader_node: " 10.1.0.2 ".to_string(),
            worker_nodes: vec!["10.1.0.3".to_string()],
            ..MultiLoaderConfig::default()
        };
        let group = resolver.resolve(&config).await.unwrap();

        assert_eq!(group.loader_node, "10.1.0.2");
        assert!(disco.queries().is_empty());
    }

    #[tokio::test]
    async fn test_validate_probes_each_distinct_node() {
        let exec = Arc::new(RecordingExecutor::new());
        let resolver = NodeGroupResolver::new(Arc::new(discovery()), exec.clone());
        let group = resolver.resolve(&MultiLoaderConfig::default()).await.unwrap();

        resolver.validate(&group).await.unwrap();
        let probes = exec
            .calls()
            .into_iter()
            .filter(|c| matches!(c, RemoteCall::Probe { .. }))
            .count();
        assert_eq!(probes, 5);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_fatal() {
        let exec = Arc::new(RecordingExecutor::new().fail_node("10.0.0.5"));
        let resolver = NodeGroupResolver::new(Arc::new(discovery()), exec);
        let group = resolver.resolve(&MultiLoaderConfig::default()).await.unwrap();

        match resolver.validate(&group).await {
            Err(LoaderError::NodeUnreachable { node, .. }) => assert_eq!(node, "10.0.0.5"),
            other => panic!("expected NodeUnreachable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_address_rejected_before_probing() {
        let exec = Arc::new(RecordingExecutor::new());
        let resolver = NodeGroupResolver::new(Arc::new(StaticDiscovery::new()), exec.clone());
        let group = NodeGroup {
            master_node: "master.local".to_string(),
            auto_scaler_node: "10.0.0.1".to_string(),
            activator_node: "10.0.0.1".to_string(),
            loader_node: "10.0.0.1".to_string(),
            worker_nodes: vec!["10.0.0.2".to_string()],
        };

        assert!(matches!(
            resolver.validate(&group).await,
            Err(LoaderError::NodeUnreachable { .. })
        ));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_label_is_error() {
        let resolver = NodeGroupResolver::new(
            Arc::new(StaticDiscovery::new().with_label("worker", &["10.0.0.4"])),
            Arc::new(RecordingExecutor::new()),
        );
        assert!(resolver.resolve(&MultiLoaderConfig::default()).await.is_err());
    }
}
