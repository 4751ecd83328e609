//! Collectable metric categories.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{LoaderError, Result};

/// A category of operational data harvested after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKind {
    /// Per-node `top` process sampling.
    Top,
    /// Knative autoscaler pod logs.
    AutoScaler,
    /// Knative activator pod logs.
    Activator,
    /// Prometheus TSDB snapshot.
    Prometheus,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Top,
        MetricKind::AutoScaler,
        MetricKind::Activator,
        MetricKind::Prometheus,
    ];

    /// Name used in the `Metrics` list of the configuration document.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Top => "top",
            MetricKind::AutoScaler => "autoscaler",
            MetricKind::Activator => "activator",
            MetricKind::Prometheus => "prometheus",
        }
    }

    /// Subdirectory of the experiment directory this category writes into.
    pub fn dir_name(&self) -> &'static str {
        match self {
            MetricKind::Top => "top",
            MetricKind::AutoScaler => "autoscaler",
            MetricKind::Activator => "activator",
            MetricKind::Prometheus => "prometheus_snapshot",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                LoaderError::config(format!(
                    "invalid metric '{}', choose from [top, autoscaler, activator, prometheus]",
                    s
                ))
            })
    }
}

/// The set of categories requested for collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricManifest {
    kinds: BTreeSet<MetricKind>,
}

impl MetricManifest {
    /// Parse the configuration's `Metrics` list; any unknown name is an error.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let kinds = names
            .iter()
            .map(|name| name.as_ref().parse())
            .collect::<Result<BTreeSet<_>>>()?;
        Ok(Self { kinds })
    }

    pub fn contains(&self, kind: MetricKind) -> bool {
        self.kinds.contains(&kind)
    }
}
