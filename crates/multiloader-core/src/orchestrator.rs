//! Top-level driver sequencing studies and their sub-experiments.
//!
//! One pass runs the global pre-script, then for every study expands it,
//! runs its pre-script, and drives each sub-experiment through merge,
//! prepare, run, collect and cleanup before moving on. A sub-experiment that
//! fails both attempts, or whose log cannot be written, skips the rest of
//! its study. Configuration and reachability errors abort the pass. Run
//! counters cover a single pass.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use multiloader_remote::{ClusterDiscovery, RemoteExecutor};
use tracing::{error, info};

use crate::collector::MetricCollector;
use crate::counters::COUNTERS;
use crate::domain::{MultiLoaderConfig, NodeGroup, RunOutcome, Study, SubExperiment};
use crate::error::Result;
use crate::expander::{format_timestamp, StudyExpander};
use crate::nodes::NodeGroupResolver;
use crate::obs::{self, ExperimentSpan};
use crate::overlay::{load_base_config, ConfigOverlay};
use crate::runner::{ExperimentRunner, RunnerSettings};
use crate::scripts::run_script;
use crate::validation::validate_config;

pub struct StudyOrchestrator {
    config: MultiLoaderConfig,
    overlay: ConfigOverlay,
    runner: ExperimentRunner,
    collector: MetricCollector,
    nodes: NodeGroup,
    timestamp: String,
    dry_run_success: bool,
}

impl StudyOrchestrator {
    /// Validate `config`, detect the platform and, on Knative, resolve and
    /// probe the node group. Any failure here stops the run.
    pub async fn new(
        mut config: MultiLoaderConfig,
        settings: RunnerSettings,
        discovery: Arc<dyn ClusterDiscovery>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Result<Self> {
        let manifest = validate_config(&mut config)?;
        let platform = load_base_config(Path::new(&config.base_config_path))?.platform;
        info!(platform = %platform, "Detected platform");

        let nodes = if platform.starts_with("Knative") {
            let resolver = NodeGroupResolver::new(discovery, executor.clone());
            let group = resolver.resolve(&config).await?;
            resolver.validate(&group).await?;
            group
        } else {
            NodeGroup::default()
        };

        let collector = MetricCollector::new(&platform, manifest, nodes.clone(), executor)?;
        Ok(Self {
            overlay: ConfigOverlay::new(&config.base_config_path),
            runner: ExperimentRunner::new(settings)?,
            collector,
            nodes,
            timestamp: format_timestamp(&chrono::Local::now()),
            dry_run_success: true,
            config,
        })
    }

    /// Replace the directory timestamp taken at construction.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn config(&self) -> &MultiLoaderConfig {
        &self.config
    }

    pub fn node_group(&self) -> &NodeGroup {
        &self.nodes
    }

    /// Whether every sub-experiment run so far succeeded.
    pub fn dry_run_success(&self) -> bool {
        self.dry_run_success
    }

    /// Run every study with output under `dry_run/` and no metric collection.
    pub async fn run_dry_run(&mut self) -> Result<bool> {
        info!("Running dry run");
        self.run_pass(true).await
    }

    pub async fn run_actual(&mut self) -> Result<bool> {
        info!("Running actual experiments");
        self.run_pass(false).await
    }

    async fn run_pass(&mut self, dry_run: bool) -> Result<bool> {
        let expander = StudyExpander::new(
            self.timestamp.clone(),
            dry_run,
            self.runner.settings().defaults,
        );

        COUNTERS.reset();
        run_script(&self.config.pre_script).await?;
        let mut all_passed = true;
        for study in &self.config.studies {
            if !self.run_study(&expander, study).await? {
                all_passed = false;
            }
        }
        run_script(&self.config.post_script).await?;

        if !all_passed {
            self.dry_run_success = false;
        }
        obs::emit_orchestrator_finished(dry_run, all_passed);
        COUNTERS.flush();
        Ok(all_passed)
    }

    async fn run_study(&self, expander: &StudyExpander, study: &Study) -> Result<bool> {
        info!(study = %study.name, "Setting up study");
        let experiments = expander.expand(study)?;
        obs::emit_study_started(&study.name, experiments.len(), expander.is_dry_run());

        run_script(&study.pre_script).await?;
        let mut passed = true;
        for experiment in &experiments {
            if expander.is_dry_run() {
                info!(experiment = %experiment.name, "Dry running");
            }
            let outcome = ExperimentSpan::new(&experiment.name)
                .instrument(self.run_experiment(experiment, expander.is_dry_run()))
                .await?;
            if !outcome.succeeded {
                info!(
                    experiment = %experiment.name,
                    "Experiment failed, skipping remaining experiments in study"
                );
                passed = false;
                break;
            }
        }
        run_script(&study.post_script).await?;

        if experiments.len() > 1 && !expander.is_dry_run() {
            info!(study = %study.name, "All experiments completed");
        }
        Ok(passed)
    }

    async fn run_experiment(&self, experiment: &SubExperiment, dry_run: bool) -> Result<RunOutcome> {
        let started = Instant::now();
        let merged = self.overlay.merge(experiment)?;
        obs::emit_experiment_started(&experiment.name, &merged.digest()?);

        let dir = self.runner.prepare(experiment, &merged)?;
        self.collector.reset_top().await;

        let result = self.execute(experiment, &dir, dry_run).await;
        self.runner.cleanup().await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if !e.is_fatal() => {
                error!(experiment = %experiment.name, error = %e, "Experiment could not run");
                RunOutcome::failure(0, e.to_string())
            }
            Err(e) => return Err(e),
        };

        COUNTERS.inc_experiments_run();
        if !outcome.succeeded {
            COUNTERS.inc_experiments_failed();
        }
        obs::emit_experiment_finished(
            &experiment.name,
            outcome.attempts,
            outcome.succeeded,
            started.elapsed().as_millis() as u64,
        );
        Ok(outcome)
    }

    async fn execute(
        &self,
        experiment: &SubExperiment,
        dir: &Path,
        dry_run: bool,
    ) -> Result<RunOutcome> {
        let outcome = self.runner.run(experiment).await?;
        if !outcome.succeeded {
            error!(
                experiment = %experiment.name,
                error = outcome.last_error.as_deref().unwrap_or("unknown"),
                "Experiment exhausted its attempts"
            );
        } else if !dry_run {
            self.collector.clear(dir)?;
            let report = self.collector.collect(dir).await?;
            obs::emit_metrics_collected(&experiment.name, report.categories, report.failures);
        }
        Ok(outcome)
    }
}
