//! Up-front checks of the multi-loader configuration document.
//!
//! Everything here runs before the first study is expanded; any failure is a
//! configuration error and stops the run.

use std::path::Path;

use tracing::{info, warn};

use crate::domain::loader_config::{OUTPUT_PATH_PREFIX, TRACE_PATH};
use crate::domain::{MetricManifest, MultiLoaderConfig, Study};
use crate::error::{LoaderError, Result};
use crate::sweep;

/// Placeholder substituted by each trace value in `TracesFormat`.
pub const TRACE_FORMAT_PLACEHOLDER: &str = "{}";

/// Validate `config` in place and return the requested metric manifest.
///
/// Studies without any output location get `data/out/<Name>` as their
/// `OutputDir`.
pub fn validate_config(config: &mut MultiLoaderConfig) -> Result<MetricManifest> {
    info!("Checking multi-loader configuration");

    let manifest = MetricManifest::from_names(&config.metrics)?;

    if config.base_config_path.trim().is_empty() {
        return Err(LoaderError::config("missing BaseConfigPath"));
    }
    if !Path::new(&config.base_config_path).exists() {
        return Err(LoaderError::config(format!(
            "BaseConfigPath {} does not exist",
            config.base_config_path
        )));
    }

    if config.studies.is_empty() {
        return Err(LoaderError::config("no studies found in configuration file"));
    }

    for study in &mut config.studies {
        validate_study(study)?;
    }

    info!(studies = config.studies.len(), "All study configs are valid");
    Ok(manifest)
}

fn validate_study(study: &mut Study) -> Result<()> {
    if study.name.trim().is_empty() {
        return Err(LoaderError::config("study is missing a Name"));
    }

    let has_format = !study.traces_format.is_empty() && !study.trace_values.is_empty();
    if study.traces_dir.is_empty() && !has_format && !study.config.contains(TRACE_PATH) {
        return Err(LoaderError::config(format!(
            "study {} is missing one of TracesDir, TracesFormat & TraceValues, Config.TracePath",
            study.name
        )));
    }

    if !study.traces_format.is_empty() && !study.traces_format.contains(TRACE_FORMAT_PLACEHOLDER) {
        return Err(LoaderError::config(format!(
            "invalid TracesFormat in study {}: missing {} in format",
            study.name, TRACE_FORMAT_PLACEHOLDER
        )));
    }

    if study.output_dir.is_empty() && !study.config.contains(OUTPUT_PATH_PREFIX) {
        study.output_dir = Path::new("data")
            .join("out")
            .join(&study.name)
            .to_string_lossy()
            .into_owned();
        warn!(
            study = %study.name,
            output_dir = %study.output_dir,
            "Missing OutputDir and Config.OutputPathPrefix, using default output directory"
        );
    }

    sweep::validate(&study.sweep, study.sweep_type)
        .map_err(|e| LoaderError::config(format!("study {}: {}", study.name, e)))
}
