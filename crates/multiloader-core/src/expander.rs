//! Study expansion: one study declaration into its ordered sub-experiments.
//!
//! The expansion mode is chosen in priority order:
//!
//! 1. `TracesDir` set: one sub-experiment per directory entry, sorted by name.
//! 2. `TracesFormat` and `TraceValues` set: one per value, with the value
//!    substituted for `{}` in the format.
//! 3. Otherwise a single sub-experiment mirroring the study.
//!
//! Sweeps then multiply every trace-derived sub-experiment. Each result gets
//! its own `OutputPathPrefix` of the form
//! `<OutputDir>/<Study>/[dry_run/]<timestamp>_<file>/<file>`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::loader_config::{OUTPUT_PATH_PREFIX, TRACE_PATH};
use crate::domain::{Study, SubExperiment, Verbosity};
use crate::error::{LoaderError, Result};
use crate::sweep;
use crate::validation::TRACE_FORMAT_PLACEHOLDER;

/// Extra path segment separating dry-run output from real output.
pub const DRY_RUN_MARKER: &str = "dry_run";

/// Minute-granular timestamp format used in experiment directory names
/// (`Jan_02_1504`).
pub const TIMESTAMP_FORMAT: &str = "%b_%d_%H%M";

/// Format `at` for use in experiment directory names.
pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Orchestrator-wide flags applied to sub-experiments that leave them unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionDefaults {
    pub verbosity: Verbosity,
    pub iat_generation: bool,
    pub generated: bool,
}

/// A sub-experiment before sweeps and output paths are applied.
#[derive(Debug)]
struct Seed {
    name: String,
    file_name: String,
    output_dir: String,
    trace_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StudyExpander {
    timestamp: String,
    dry_run: bool,
    defaults: ExpansionDefaults,
}

impl StudyExpander {
    pub fn new(timestamp: impl Into<String>, dry_run: bool, defaults: ExpansionDefaults) -> Self {
        Self {
            timestamp: timestamp.into(),
            dry_run,
            defaults,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Expand `study`. Deterministic for a given timestamp and dry-run flag.
    pub fn expand(&self, study: &Study) -> Result<Vec<SubExperiment>> {
        info!(study = %study.name, "Expanding study");

        let seeds = if !study.traces_dir.is_empty() {
            from_trace_dir(study)?
        } else if !study.traces_format.is_empty() && !study.trace_values.is_empty() {
            from_trace_values(study)?
        } else {
            vec![singleton(study)]
        };

        let variants = sweep::variants(&study.sweep, study.sweep_type)
            .map_err(|e| LoaderError::config(format!("study {}: {}", study.name, e)))?;

        let mut experiments = Vec::with_capacity(seeds.len() * variants.len());
        for seed in &seeds {
            for assignment in &variants {
                experiments.push(self.materialize(study, seed, assignment)?);
            }
        }
        debug!(study = %study.name, count = experiments.len(), "Study expanded");
        Ok(experiments)
    }

    fn materialize(
        &self,
        study: &Study,
        seed: &Seed,
        assignment: &[(String, Value)],
    ) -> Result<SubExperiment> {
        let suffix = sweep::suffix(assignment)?;
        let file_name = format!("{}{}", seed.file_name, suffix);

        let mut config = study.config.clone();
        if let Some(trace_path) = &seed.trace_path {
            config.set(TRACE_PATH, trace_path.clone());
        }
        for (field, value) in assignment {
            config.set(field.clone(), value.clone());
        }
        config.set(
            OUTPUT_PATH_PREFIX,
            self.output_path_prefix(&seed.output_dir, &study.name, &file_name),
        );

        Ok(SubExperiment {
            name: format!("{}{}", seed.name, suffix),
            config,
            output_dir: seed.output_dir.clone(),
            verbosity: study.verbosity.unwrap_or(self.defaults.verbosity),
            iat_generation: study.iat_generation || self.defaults.iat_generation,
            generated: study.generated || self.defaults.generated,
        })
    }

    fn output_path_prefix(&self, output_dir: &str, study_name: &str, file_name: &str) -> String {
        let stamped = format!("{}_{}", self.timestamp, file_name);
        let marker = if self.dry_run { DRY_RUN_MARKER } else { "" };

        let mut path = PathBuf::new();
        for segment in [output_dir, study_name, marker, stamped.as_str(), file_name] {
            if !segment.is_empty() {
                path.push(segment);
            }
        }
        path.to_string_lossy().into_owned()
    }
}

fn from_trace_dir(study: &Study) -> Result<Vec<Seed>> {
    let entries = std::fs::read_dir(&study.traces_dir).map_err(|e| {
        LoaderError::config(format!("cannot read TracesDir {}: {}", study.traces_dir, e))
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            LoaderError::config(format!("cannot read TracesDir {}: {}", study.traces_dir, e))
        })?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    Ok(names
        .into_iter()
        .map(|entry| Seed {
            name: format!("{}_{}", study.name, entry),
            trace_path: Some(
                Path::new(&study.traces_dir)
                    .join(&entry)
                    .to_string_lossy()
                    .into_owned(),
            ),
            file_name: entry,
            output_dir: study.output_dir.clone(),
        })
        .collect())
}

fn from_trace_values(study: &Study) -> Result<Vec<Seed>> {
    study
        .trace_values
        .iter()
        .map(|value| {
            let text = sweep::value_text(value).map_err(|e| {
                LoaderError::config(format!("study {} TraceValues: {}", study.name, e))
            })?;
            let trace_path = study.traces_format.replace(TRACE_FORMAT_PLACEHOLDER, &text);
            let file_name = Path::new(&trace_path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| trace_path.clone());
            Ok(Seed {
                name: format!("{}_{}", study.name, file_name),
                file_name,
                output_dir: study.output_dir.clone(),
                trace_path: Some(trace_path),
            })
        })
        .collect()
}

fn singleton(study: &Study) -> Seed {
    let output_dir = study
        .config
        .get_str(OUTPUT_PATH_PREFIX)
        .map(|prefix| {
            Path::new(prefix)
                .parent()
                .map(|dir| dir.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .unwrap_or_else(|| study.output_dir.clone());

    Seed {
        name: study.name.clone(),
        file_name: study.name.clone(),
        output_dir,
        trace_path: None,
    }
}
