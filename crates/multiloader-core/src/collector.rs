//! Post-run harvesting of operational metrics from the cluster nodes.
//!
//! Categories are collected concurrently and independently. Remote failures
//! are logged and counted; only a failure to create a local output directory
//! is returned as an error. Nothing is collected unless the platform is a
//! Knative flavour.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use multiloader_remote::RemoteExecutor;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::counters::COUNTERS;
use crate::domain::{MetricKind, MetricManifest, NodeGroup};
use crate::error::{LoaderError, Result};
use crate::obs;

pub const TOP_FILENAME: &str = "top.txt";
pub const KILL_TOP_COMMAND: &str = "if pgrep top >/dev/null; then killall top; fi";
pub const START_TOP_COMMAND: &str = "top -b -d 15 -c -w 512 > top.txt 2>&1 &";

pub const AUTOSCALER_LOG_GLOB: &str = "/var/log/pods/knative-serving_autoscaler-*/autoscaler/*";
pub const ACTIVATOR_LOG_GLOB: &str = "/var/log/pods/knative-serving_activator-*/activator/*";

pub const SNAPSHOT_COMMAND: &str = "curl -XPOST http://localhost:9090/api/v1/admin/tsdb/snapshot";
pub const REMOTE_SNAPSHOT_DIR: &str = "~/tmp/prometheus_snapshot";
const PROMETHEUS_POD: &str = "prometheus-prometheus-kube-prometheus-prometheus-0";

const SNAPSHOT_ATTEMPTS: u32 = 10;
const SNAPSHOT_BACKOFF: Duration = Duration::from_millis(100);

/// Counts from one collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub categories: usize,
    pub failures: usize,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    #[serde(default)]
    status: String,
}

pub struct MetricCollector {
    manifest: MetricManifest,
    nodes: NodeGroup,
    executor: Arc<dyn RemoteExecutor>,
    platform_supported: bool,
    snapshot_json: Regex,
    snapshot_backoff: Duration,
}

impl MetricCollector {
    pub fn new(
        platform: &str,
        manifest: MetricManifest,
        nodes: NodeGroup,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Result<Self> {
        let snapshot_json = Regex::new(r"\{.*\}")
            .map_err(|e| LoaderError::config(format!("invalid snapshot pattern: {}", e)))?;
        Ok(Self {
            manifest,
            nodes,
            executor,
            platform_supported: platform.starts_with("Knative"),
            snapshot_json,
            snapshot_backoff: SNAPSHOT_BACKOFF,
        })
    }

    /// Override the pause between snapshot polls.
    pub fn with_snapshot_backoff(mut self, backoff: Duration) -> Self {
        self.snapshot_backoff = backoff;
        self
    }

    pub fn should_collect(&self, kind: MetricKind) -> bool {
        self.platform_supported && self.manifest.contains(kind)
    }

    fn enabled(&self) -> Vec<MetricKind> {
        MetricKind::ALL
            .into_iter()
            .filter(|kind| self.should_collect(*kind))
            .collect()
    }

    /// Kill any running `top` sampler on every node and start a fresh one.
    pub async fn reset_top(&self) {
        if !self.should_collect(MetricKind::Top) {
            return;
        }
        debug!("Resetting top samplers");
        let handles = self.nodes.top_nodes().into_iter().map(|node| {
            let executor = self.executor.clone();
            tokio::spawn(async move {
                if let Err(e) = executor.run(&node, KILL_TOP_COMMAND).await {
                    warn!(node = %node, error = %e, "Failed to stop top sampler");
                }
                if let Err(e) = executor.run(&node, START_TOP_COMMAND).await {
                    report_failure(MetricKind::Top, &node, &e);
                }
            })
        });
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                warn!(error = %e, "Top reset task did not complete");
            }
        }
    }

    /// Harvest all enabled categories into `experiment_dir`.
    pub async fn collect(&self, experiment_dir: &Path) -> Result<CollectionReport> {
        let enabled = self.enabled();
        if enabled.is_empty() {
            debug!("No metrics to collect");
            return Ok(CollectionReport::default());
        }
        info!(dir = %experiment_dir.display(), "Collecting metrics");

        for kind in &enabled {
            let dir = experiment_dir.join(kind.dir_name());
            std::fs::create_dir_all(&dir).map_err(|e| {
                LoaderError::MetricCollection(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }

        let (top, autoscaler, activator, prometheus) = futures::join!(
            self.collect_top(experiment_dir.join(MetricKind::Top.dir_name())),
            self.collect_logs(
                MetricKind::AutoScaler,
                &self.nodes.auto_scaler_node,
                AUTOSCALER_LOG_GLOB,
                experiment_dir,
            ),
            self.collect_logs(
                MetricKind::Activator,
                &self.nodes.activator_node,
                ACTIVATOR_LOG_GLOB,
                experiment_dir,
            ),
            self.collect_prometheus(experiment_dir),
        );

        Ok(CollectionReport {
            categories: enabled.len(),
            failures: top + autoscaler + activator + prometheus,
        })
    }

    /// Remove the directories produced by the enabled categories.
    pub fn clear(&self, experiment_dir: &Path) -> Result<()> {
        debug!(dir = %experiment_dir.display(), "Clearing collected metrics");
        for kind in self.enabled() {
            let dir = experiment_dir.join(kind.dir_name());
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(LoaderError::MetricCollection(format!(
                        "cannot clear {}: {}",
                        dir.display(),
                        e
                    )))
                }
            }
        }
        Ok(())
    }

    async fn collect_top(&self, top_dir: PathBuf) -> usize {
        if !self.should_collect(MetricKind::Top) {
            return 0;
        }
        let handles = self.nodes.top_nodes().into_iter().map(|node| {
            let executor = self.executor.clone();
            let dst = top_dir.join(format!("top_{}.txt", node));
            tokio::spawn(async move {
                if let Err(e) = executor.run(&node, KILL_TOP_COMMAND).await {
                    warn!(node = %node, error = %e, "Failed to stop top sampler");
                }
                match executor.copy(&node, TOP_FILENAME, &dst).await {
                    Ok(()) => 0,
                    Err(e) => {
                        report_failure(MetricKind::Top, &node, &e);
                        1
                    }
                }
            })
        });

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    warn!(error = %e, "Top collection task did not complete");
                    1
                })
            })
            .sum()
    }

    async fn collect_logs(
        &self,
        kind: MetricKind,
        node: &str,
        remote_glob: &str,
        experiment_dir: &Path,
    ) -> usize {
        if !self.should_collect(kind) {
            return 0;
        }
        debug!(metric = %kind, node = %node, "Collecting pod logs");
        let dst = experiment_dir.join(kind.dir_name());
        match self.executor.copy(node, remote_glob, &dst).await {
            Ok(()) => 0,
            Err(e) => {
                report_failure(kind, node, &e);
                1
            }
        }
    }

    async fn collect_prometheus(&self, experiment_dir: &Path) -> usize {
        if !self.should_collect(MetricKind::Prometheus) {
            return 0;
        }
        let master = self.nodes.master_node.as_str();
        debug!(node = %master, "Collecting prometheus snapshot");

        if let Err(reason) = self.trigger_snapshot(master).await {
            report_failure(MetricKind::Prometheus, master, &reason);
            return 1;
        }

        let copy_steps = async {
            self.executor
                .run(master, &format!("mkdir -p {}", REMOTE_SNAPSHOT_DIR))
                .await?;
            self.executor
                .run(
                    master,
                    &format!(
                        "kubectl cp -n monitoring {}:/prometheus/snapshots/ -c prometheus {}",
                        PROMETHEUS_POD, REMOTE_SNAPSHOT_DIR
                    ),
                )
                .await?;
            // Lands as <experiment_dir>/prometheus_snapshot.
            self.executor
                .copy(master, REMOTE_SNAPSHOT_DIR, experiment_dir)
                .await
        };
        let failures = match copy_steps.await {
            Ok(()) => 0,
            Err(e) => {
                report_failure(MetricKind::Prometheus, master, &e);
                1
            }
        };

        if let Err(e) = self
            .executor
            .run(master, &format!("rm -rf {}", REMOTE_SNAPSHOT_DIR))
            .await
        {
            warn!(node = %master, error = %e, "Failed to remove remote snapshot copy");
        }
        failures
    }

    /// Poll the snapshot endpoint until it reports success.
    async fn trigger_snapshot(&self, master: &str) -> std::result::Result<(), String> {
        let mut last = String::from("no response");
        for attempt in 1..=SNAPSHOT_ATTEMPTS {
            match self.executor.run(master, SNAPSHOT_COMMAND).await {
                Ok(body) => {
                    let status = self
                        .snapshot_json
                        .find(&body)
                        .and_then(|m| serde_json::from_str::<SnapshotResponse>(m.as_str()).ok())
                        .map(|r| r.status);
                    if status.as_deref() == Some("success") {
                        return Ok(());
                    }
                    debug!(attempt, "Prometheus snapshot not ready");
                    last = format!("snapshot status {:?}", status.unwrap_or_default());
                }
                Err(e) => last = e.to_string(),
            }
            if attempt < SNAPSHOT_ATTEMPTS {
                tokio::time::sleep(self.snapshot_backoff).await;
            }
        }
        Err(format!(
            "exhausted {} attempts to create a snapshot: {}",
            SNAPSHOT_ATTEMPTS, last
        ))
    }
}

fn report_failure(kind: MetricKind, node: &str, error: &dyn std::fmt::Display) {
    COUNTERS.inc_metric_failures();
    obs::emit_metric_failed(kind.as_str(), node, error);
}
