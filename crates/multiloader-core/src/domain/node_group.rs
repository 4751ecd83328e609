//! Cluster node roles used for validation and metric collection.

use serde::{Deserialize, Serialize};

/// Addresses of the cluster nodes an experiment touches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroup {
    pub master_node: String,
    pub auto_scaler_node: String,
    pub activator_node: String,
    pub loader_node: String,
    pub worker_nodes: Vec<String>,
}

impl NodeGroup {
    /// Nodes that run a `top` sampler, in role order and without duplicates.
    ///
    /// Master, autoscaler, activator and loader come first, followed by the
    /// workers. Blank entries are skipped.
    pub fn top_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = Vec::new();
        let candidates = [
            &self.master_node,
            &self.auto_scaler_node,
            &self.activator_node,
            &self.loader_node,
        ]
        .into_iter()
        .chain(self.worker_nodes.iter());

        for node in candidates {
            let node = node.trim();
            if !node.is_empty() && !nodes.iter().any(|n| n == node) {
                nodes.push(node.to_string());
            }
        }
        nodes
    }
}
