//! Run counters across the dry and real passes. Kept in its own test binary
//! since the counters are process-wide.

use std::sync::Arc;

use multiloader_core::{
    CommandLine, MultiLoaderConfig, RunnerSettings, StudyOrchestrator, COUNTERS,
};
use multiloader_remote::fakes::{RecordingExecutor, StaticDiscovery};
use serde_json::json;

#[tokio::test]
async fn counters_cover_a_single_pass() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base_config.json");
    std::fs::write(&base, json!({"Platform": "OpenWhisk"}).to_string()).unwrap();
    let script = dir.path().join("engine.sh");
    std::fs::write(&script, "exit 0\n").unwrap();
    let out = dir.path().join("out");

    let config: MultiLoaderConfig = serde_json::from_value(json!({
        "Studies": [{
            "Name": "s1",
            "TracesFormat": "trace_{}.csv",
            "TraceValues": ["a", "b", "c"],
            "OutputDir": out.to_string_lossy()
        }],
        "BaseConfigPath": base.to_string_lossy()
    }))
    .unwrap();
    let settings = RunnerSettings {
        engine: CommandLine::new("sh", [script.to_string_lossy().into_owned()]),
        temp_config_path: dir.path().join("current_running_config.json"),
        clean_command: None,
        ..RunnerSettings::default()
    };

    let mut orchestrator = StudyOrchestrator::new(
        config,
        settings,
        Arc::new(StaticDiscovery::new()),
        Arc::new(RecordingExecutor::new()),
    )
    .await
    .unwrap()
    .with_timestamp("ts");

    assert!(orchestrator.run_dry_run().await.unwrap());
    assert_eq!(COUNTERS.experiments_run(), 3);

    assert!(orchestrator.run_actual().await.unwrap());
    assert_eq!(COUNTERS.experiments_run(), 3);
    assert_eq!(COUNTERS.experiments_failed(), 0);
    assert_eq!(COUNTERS.attempts_retried(), 0);
}
