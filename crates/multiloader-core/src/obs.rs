//! Structured lifecycle events for studies and experiments.
//!
//! Every event is an `info!` (or `warn!`) with an `event` field so that the
//! JSON log format can be filtered by event name.

use std::future::Future;

use tracing::instrument::Instrumented;
use tracing::{info, Instrument};

/// Span tagging all logs of one sub-experiment with its name.
///
/// Attached to the experiment's future rather than entered.
///
/// ```ignore
/// ExperimentSpan::new("s1_trace_a").instrument(run(experiment)).await
/// ```
pub struct ExperimentSpan {
    span: tracing::Span,
}

impl ExperimentSpan {
    pub fn new(experiment: &str) -> Self {
        Self {
            span: tracing::info_span!("multiloader.experiment", experiment = %experiment),
        }
    }

    pub fn instrument<F: Future>(self, future: F) -> Instrumented<F> {
        future.instrument(self.span)
    }
}

pub fn emit_study_started(study: &str, experiments: usize, dry_run: bool) {
    info!(
        event = "study.started",
        study = %study,
        experiments = experiments,
        dry_run = dry_run,
    );
}

/// Emit event: an experiment is about to run with the given merged config.
pub fn emit_experiment_started(experiment: &str, config_digest: &str) {
    info!(event = "experiment.started", experiment = %experiment, config_digest = %config_digest);
}

pub fn emit_experiment_finished(experiment: &str, attempts: u32, succeeded: bool, duration_ms: u64) {
    info!(
        event = "experiment.finished",
        experiment = %experiment,
        attempts = attempts,
        succeeded = succeeded,
        duration_ms = duration_ms,
    );
}

/// Emit event: metric collection for one experiment completed.
pub fn emit_metrics_collected(experiment: &str, categories: usize, failures: usize) {
    info!(
        event = "metrics.collected",
        experiment = %experiment,
        categories = categories,
        failures = failures,
    );
}

/// Emit event: one metric source could not be harvested (warning level).
pub fn emit_metric_failed(metric: &str, node: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "metrics.failed", metric = %metric, node = %node, error = %error);
}

pub fn emit_orchestrator_finished(dry_run: bool, success: bool) {
    info!(event = "orchestrator.finished", dry_run = dry_run, success = success);
}
