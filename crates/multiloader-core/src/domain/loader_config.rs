//! Loader configuration schema and sparse per-experiment overrides.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which the loader expects its output path prefix.
pub const OUTPUT_PATH_PREFIX: &str = "OutputPathPrefix";

/// Key under which the loader expects its trace path.
pub const TRACE_PATH: &str = "TracePath";

/// Full configuration consumed by the external loader.
///
/// Field names follow the loader's JSON document. Fields missing from a base
/// document take their zero value, as the loader itself does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoaderConfiguration {
    pub seed: i64,

    pub platform: String,
    pub invoke_protocol: String,
    #[serde(rename = "YAMLSelector")]
    pub yaml_selector: String,
    pub endpoint_port: i64,

    pub rps_target: f64,
    pub rps_cold_start_ratio_percentage: f64,
    pub rps_cooldown_seconds: i64,
    pub rps_runtime_ms: i64,
    #[serde(rename = "RpsMemoryMB")]
    pub rps_memory_mb: i64,
    pub rps_iteration_multiplier: i64,

    pub trace_path: String,
    pub granularity: String,
    pub output_path_prefix: String,
    #[serde(rename = "IATDistribution")]
    pub iat_distribution: String,
    #[serde(rename = "CPULimit")]
    pub cpu_limit: String,
    pub experiment_duration: i64,
    pub warmup_duration: i64,

    pub is_partially_panic: bool,
    pub enable_zipkin_tracing: bool,
    pub enable_metrics_scrapping: bool,
    pub metric_scraping_period_seconds: i64,
    pub autoscaling_metric: String,

    #[serde(rename = "GRPCConnectionTimeoutSeconds")]
    pub grpc_connection_timeout_seconds: i64,
    #[serde(rename = "GRPCFunctionTimeoutSeconds")]
    pub grpc_function_timeout_seconds: i64,
    #[serde(rename = "DAGMode")]
    pub dag_mode: bool,
    #[serde(rename = "EnableDAGDataset")]
    pub enable_dag_dataset: bool,
    pub width: i64,
    pub depth: i64,
    #[serde(rename = "VSwarm")]
    pub vswarm: bool,

    pub dirigent_config_path: String,
}

impl LoaderConfiguration {
    /// Whether the platform exposes the Knative autoscaler/activator logs.
    pub fn is_knative(&self) -> bool {
        self.platform.starts_with("Knative")
    }
}

/// Sparse, dynamically typed overrides declared in a study's `Config` map.
///
/// Backed by a `BTreeMap` so iteration and serialization are ordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigOverrides(BTreeMap<String, Value>);

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_loader_configuration_uses_loader_field_names() {
        let config: LoaderConfiguration = serde_json::from_value(json!({
            "Platform": "Knative",
            "IATDistribution": "exponential",
            "CPULimit": "1vCPU",
            "RpsMemoryMB": 128,
            "GRPCConnectionTimeoutSeconds": 15,
            "YAMLSelector": "container",
            "ExperimentDuration": 5
        }))
        .unwrap();

        assert_eq!(config.iat_distribution, "exponential");
        assert_eq!(config.cpu_limit, "1vCPU");
        assert_eq!(config.rps_memory_mb, 128);
        assert_eq!(config.grpc_connection_timeout_seconds, 15);
        assert_eq!(config.yaml_selector, "container");
        assert_eq!(config.experiment_duration, 5);
        assert!(config.is_knative());
    }

    #[test]
    fn test_missing_fields_default() {
        let config: LoaderConfiguration = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LoaderConfiguration::default());
        assert!(!config.is_knative());
    }

    #[test]
    fn test_knative_rps_counts_as_knative() {
        let config = LoaderConfiguration {
            platform: "Knative-RPS".to_string(),
            ..LoaderConfiguration::default()
        };
        assert!(config.is_knative());
    }

    #[test]
    fn test_overrides_accessors() {
        let mut overrides = ConfigOverrides::new();
        assert_eq!(overrides.iter().count(), 0);
        overrides.set(TRACE_PATH, "data/traces/x");
        overrides.set("ExperimentDuration", 10);

        assert_eq!(overrides.get_str(TRACE_PATH), Some("data/traces/x"));
        assert_eq!(overrides.get_str("ExperimentDuration"), None);
        assert!(overrides.contains("ExperimentDuration"));
        let keys: Vec<_> = overrides.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["ExperimentDuration", "TracePath"]);
    }
}
