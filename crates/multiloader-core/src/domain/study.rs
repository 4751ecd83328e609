//! Study declarations and the concrete sub-experiments expanded from them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::loader_config::{ConfigOverrides, OUTPUT_PATH_PREFIX};
use super::verbosity::{self, Verbosity};
use crate::error::{LoaderError, Result};

/// Top-level multi-loader configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MultiLoaderConfig {
    pub studies: Vec<Study>,
    pub base_config_path: String,

    pub pre_script: String,
    pub post_script: String,

    pub master_node: String,
    pub auto_scaler_node: String,
    pub activator_node: String,
    pub loader_node: String,
    pub worker_nodes: Vec<String>,

    pub metrics: Vec<String>,
}

impl MultiLoaderConfig {
    /// Read and parse the configuration document at `path`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            LoaderError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| LoaderError::config(format!("cannot parse {}: {}", path.display(), e)))
    }
}

/// How the value lists of a study's sweep are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepType {
    /// Cartesian product of all value lists.
    #[default]
    Grid,
    /// Index-wise combination of equally long value lists.
    Linear,
}

/// One swept loader field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SweepOption {
    pub field: String,
    pub values: Vec<Value>,
}

impl SweepOption {
    pub fn validate(&self) -> Result<()> {
        if self.field.trim().is_empty() {
            return Err(LoaderError::config("sweep field should not be empty"));
        }
        if self.values.is_empty() {
            return Err(LoaderError::config(format!(
                "sweep field {} is missing values",
                self.field
            )));
        }
        Ok(())
    }
}

/// A parameterized experiment template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Study {
    pub name: String,
    pub config: ConfigOverrides,

    /// Either a directory of traces...
    pub traces_dir: String,
    /// ...or a path format with a `{}` placeholder plus the values to substitute.
    pub traces_format: String,
    pub trace_values: Vec<Value>,

    pub output_dir: String,
    #[serde(
        deserialize_with = "verbosity::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub verbosity: Option<Verbosity>,
    pub iat_generation: bool,
    pub generated: bool,
    pub pre_script: String,
    pub post_script: String,

    pub sweep: Vec<SweepOption>,
    pub sweep_type: SweepType,
}

/// One fully materialised run derived from a [`Study`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubExperiment {
    pub name: String,
    pub config: ConfigOverrides,
    pub output_dir: String,
    pub verbosity: Verbosity,
    pub iat_generation: bool,
    pub generated: bool,
}

impl SubExperiment {
    /// The resolved `OutputPathPrefix` override.
    pub fn output_path_prefix(&self) -> Option<&str> {
        self.config.get_str(OUTPUT_PATH_PREFIX)
    }

    /// Directory holding the loader's outputs, its log and collected metrics.
    pub fn experiment_dir(&self) -> PathBuf {
        self.output_path_prefix()
            .map(Path::new)
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&self.output_dir))
    }

    /// Path of the per-experiment loader log.
    pub fn log_path(&self) -> PathBuf {
        self.experiment_dir().join("loader.log")
    }
}
