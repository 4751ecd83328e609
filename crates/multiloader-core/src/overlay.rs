//! Config overlay: sparse study overrides applied onto the base loader config.
//!
//! The base document is read fresh for every sub-experiment since it may be
//! edited between runs. Overrides replace base fields key by key; `null`
//! values leave the base untouched, unknown keys are logged and ignored,
//! and a value of the wrong type fails the merge.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::domain::{ConfigOverrides, LoaderConfiguration, SubExperiment};
use crate::error::{LoaderError, Result};

/// A fully populated loader configuration ready to hand to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedConfiguration {
    config: LoaderConfiguration,
}

impl MergedConfiguration {
    pub fn config(&self) -> &LoaderConfiguration {
        &self.config
    }

    pub fn output_path_prefix(&self) -> &str {
        &self.config.output_path_prefix
    }

    /// Canonical JSON encoding (field order follows the schema).
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.config)?)
    }

    /// SHA-256 of the canonical encoding, hex encoded.
    pub fn digest(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json()?);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Write the canonical encoding to `path`, replacing any previous file.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Read and parse a base loader configuration.
pub fn load_base_config(path: &Path) -> Result<LoaderConfiguration> {
    let bytes = std::fs::read(path).map_err(|e| {
        LoaderError::config(format!("cannot read base config {}: {}", path.display(), e))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        LoaderError::config(format!("cannot parse base config {}: {}", path.display(), e))
    })
}

/// Apply `overrides` onto `base`.
pub fn merge(base: &LoaderConfiguration, overrides: &ConfigOverrides) -> Result<MergedConfiguration> {
    let mut document = serde_json::to_value(base)?;
    let fields = document
        .as_object_mut()
        .ok_or_else(|| LoaderError::config("base config does not encode as an object"))?;

    for (key, value) in overrides.iter() {
        if value.is_null() {
            debug!(key = %key, "Skipping null override");
            continue;
        }
        match fields.get_mut(key) {
            Some(slot) => *slot = value.clone(),
            None => warn!(key = %key, "Ignoring unknown loader configuration key"),
        }
    }

    let config = serde_json::from_value(document).map_err(|e| {
        LoaderError::config(format!("override does not match the loader schema: {}", e))
    })?;
    Ok(MergedConfiguration { config })
}

/// Merges each sub-experiment's overrides onto the base config on disk.
#[derive(Debug, Clone)]
pub struct ConfigOverlay {
    base_config_path: PathBuf,
}

impl ConfigOverlay {
    pub fn new(base_config_path: impl Into<PathBuf>) -> Self {
        Self {
            base_config_path: base_config_path.into(),
        }
    }

    pub fn merge(&self, experiment: &SubExperiment) -> Result<MergedConfiguration> {
        let base = load_base_config(&self.base_config_path)?;
        debug!(experiment = %experiment.name, overrides = ?experiment.config, "Merging configuration");
        merge(&base, &experiment.config)
    }
}
