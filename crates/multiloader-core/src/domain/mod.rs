//! Domain model: study declarations, loader configuration, node groups,
//! metric manifests and run outcomes.

pub mod loader_config;
pub mod metric;
pub mod node_group;
pub mod outcome;
pub mod study;
pub mod verbosity;

pub use loader_config::{ConfigOverrides, LoaderConfiguration};
pub use metric::{MetricKind, MetricManifest};
pub use node_group::NodeGroup;
pub use outcome::RunOutcome;
pub use study::{MultiLoaderConfig, Study, SubExperiment, SweepOption, SweepType};
pub use verbosity::Verbosity;
