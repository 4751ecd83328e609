//! Multi-Loader Core Library
//!
//! Expands benchmark studies into concrete load-engine runs, executes them
//! with bounded retry and harvests cluster metrics after each run.

pub mod collector;
pub mod counters;
pub mod domain;
pub mod error;
pub mod expander;
pub mod nodes;
pub mod obs;
pub mod orchestrator;
pub mod overlay;
pub mod runner;
pub mod scripts;
pub mod sweep;
pub mod telemetry;
pub mod validation;

pub use domain::{
    ConfigOverrides, LoaderConfiguration, MetricKind, MetricManifest, MultiLoaderConfig,
    NodeGroup, RunOutcome, Study, SubExperiment, SweepOption, SweepType, Verbosity,
};
pub use error::{ExecutionError, LoaderError, Result};

pub use collector::{CollectionReport, MetricCollector};
pub use counters::COUNTERS;
pub use expander::{format_timestamp, ExpansionDefaults, StudyExpander};
pub use nodes::NodeGroupResolver;
pub use orchestrator::StudyOrchestrator;
pub use overlay::{ConfigOverlay, MergedConfiguration};
pub use runner::{CommandLine, ExperimentRunner, RunnerSettings};
pub use telemetry::{init_tracing, level_for};
pub use validation::validate_config;

/// Multi-loader version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
