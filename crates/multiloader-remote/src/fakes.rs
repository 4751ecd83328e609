//! In-memory fakes for the remote traits (testing only)
//!
//! Provides `RecordingExecutor` and `StaticDiscovery` that satisfy the
//! trait contracts without touching the network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::discovery::ClusterDiscovery;
use crate::error::RemoteError;
use crate::executor::RemoteExecutor;
use crate::Result;

// ---------------------------------------------------------------------------
// RecordingExecutor
// ---------------------------------------------------------------------------

/// One call observed by [`RecordingExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Run { node: String, command: String },
    Copy { node: String, src: String, dst: String },
    Probe { node: String },
}

impl RemoteCall {
    pub fn node(&self) -> &str {
        match self {
            RemoteCall::Run { node, .. }
            | RemoteCall::Copy { node, .. }
            | RemoteCall::Probe { node } => node,
        }
    }
}

/// Executor that records every call and materialises copies as local files.
///
/// Scripted responses are matched by substring of the command; each match
/// pops the next queued response, and the last one repeats once the queue
/// runs dry.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<RemoteCall>>,
    failing_nodes: Mutex<HashSet<String>>,
    responses: Mutex<HashMap<String, VecDeque<std::result::Result<String, String>>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call against `node` fail.
    pub fn fail_node(self, node: &str) -> Self {
        self.failing_nodes.lock().unwrap().insert(node.to_string());
        self
    }

    /// Queue responses for commands containing `pattern`.
    pub fn with_responses(
        self,
        pattern: &str,
        responses: Vec<std::result::Result<String, String>>,
    ) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(pattern.to_string(), responses.into_iter().collect());
        self
    }

    /// Snapshot of all recorded calls, in arrival order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded run commands for a single node.
    pub fn commands_for(&self, node: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::Run { node: n, command } if n == node => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Number of run commands containing `pattern`.
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::Run { command, .. } if command.contains(pattern)))
            .count()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn is_failing(&self, node: &str) -> bool {
        self.failing_nodes.lock().unwrap().contains(node)
    }

    fn scripted(&self, command: &str) -> Option<std::result::Result<String, String>> {
        let mut responses = self.responses.lock().unwrap();
        let queue = responses
            .iter_mut()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, queue)| queue)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn run(&self, node: &str, command: &str) -> Result<String> {
        self.record(RemoteCall::Run {
            node: node.to_string(),
            command: command.to_string(),
        });
        if self.is_failing(node) {
            return Err(RemoteError::CommandFailed {
                node: node.to_string(),
                command: command.to_string(),
                status: 255,
                output: "connection refused".to_string(),
            });
        }
        match self.scripted(command) {
            Some(Ok(out)) => Ok(out),
            Some(Err(output)) => Err(RemoteError::CommandFailed {
                node: node.to_string(),
                command: command.to_string(),
                status: 1,
                output,
            }),
            None => Ok(String::new()),
        }
    }

    async fn copy(&self, node: &str, remote_src: &str, local_dst: &Path) -> Result<()> {
        self.record(RemoteCall::Copy {
            node: node.to_string(),
            src: remote_src.to_string(),
            dst: local_dst.display().to_string(),
        });
        if self.is_failing(node) {
            return Err(RemoteError::CopyFailed {
                node: node.to_string(),
                src: remote_src.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let target = if local_dst.is_dir() {
            let base = remote_src
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or("copied")
                .replace('*', "glob");
            local_dst.join(base)
        } else {
            local_dst.to_path_buf()
        };
        if target.is_dir() {
            std::fs::write(target.join("copied"), node)?;
        } else {
            std::fs::write(&target, node)?;
        }
        Ok(())
    }

    async fn probe(&self, node: &str) -> Result<()> {
        self.record(RemoteCall::Probe {
            node: node.to_string(),
        });
        if self.is_failing(node) {
            return Err(RemoteError::Unreachable {
                node: node.to_string(),
                reason: "Permission denied (publickey)".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StaticDiscovery
// ---------------------------------------------------------------------------

/// Discovery answering from fixed tables.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    labels: HashMap<String, Vec<String>>,
    pods: HashMap<String, String>,
    queries: Mutex<Vec<String>>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, node_type: &str, nodes: &[&str]) -> Self {
        self.labels.insert(
            node_type.to_string(),
            nodes.iter().map(|n| n.to_string()).collect(),
        );
        self
    }

    pub fn with_pod(mut self, pod_prefix: &str, host: &str) -> Self {
        self.pods.insert(pod_prefix.to_string(), host.to_string());
        self
    }

    /// Queries made so far, as `label:<type>` or `pod:<prefix>`.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterDiscovery for StaticDiscovery {
    async fn nodes_with_label(&self, node_type: &str) -> Result<Vec<String>> {
        self.queries
            .lock()
            .unwrap()
            .push(format!("label:{}", node_type));
        self.labels
            .get(node_type)
            .cloned()
            .ok_or_else(|| RemoteError::Discovery(format!("no nodes labelled {}", node_type)))
    }

    async fn pod_host(&self, _namespace: &str, pod_prefix: &str) -> Result<String> {
        self.queries
            .lock()
            .unwrap()
            .push(format!("pod:{}", pod_prefix));
        self.pods
            .get(pod_prefix)
            .cloned()
            .ok_or_else(|| RemoteError::Discovery(format!("no {} pod", pod_prefix)))
    }
}
