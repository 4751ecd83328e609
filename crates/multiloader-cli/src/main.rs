//! Multi-Loader - experiment orchestrator for serverless load tests
//!
//! `multi-loader` reads a study configuration, runs every study once as a
//! dry run and, if all of it succeeded, runs it again for real with metric
//! collection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use multiloader_core::runner::DEFAULT_LOADER_PATH;
use multiloader_core::{
    init_tracing, level_for, CommandLine, ExpansionDefaults, MultiLoaderConfig, RunnerSettings,
    StudyOrchestrator, Verbosity,
};
use multiloader_remote::{
    ClusterDiscovery, KubectlDiscovery, RemoteExecutor, SshConfig, SshExecutor,
};

#[derive(Parser, Debug)]
#[command(name = "multi-loader")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run benchmark studies against the load generator", long_about = None)]
struct Cli {
    /// Path to the multi-loader configuration file
    #[arg(
        long,
        env = "MULTI_LOADER_CONFIG",
        default_value = "tools/multi_loader/multi_loader_config.json"
    )]
    multi_loader_config: PathBuf,

    /// Logging verbosity (info, debug, trace)
    #[arg(long, env = "MULTI_LOADER_VERBOSITY", default_value = "info")]
    verbosity: Verbosity,

    /// Generate inter-arrival times only
    #[arg(long)]
    iat_generation: bool,

    /// Use already generated inter-arrival times
    #[arg(long)]
    generated: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Loader entry point passed to `go run`
    #[arg(long, default_value = DEFAULT_LOADER_PATH)]
    loader_path: String,

    /// Kill a loader attempt that runs longer than this
    #[arg(long)]
    engine_timeout_secs: Option<u64>,
}

impl Cli {
    fn settings(&self) -> RunnerSettings {
        RunnerSettings {
            defaults: ExpansionDefaults {
                verbosity: self.verbosity,
                iat_generation: self.iat_generation,
                generated: self.generated,
            },
            engine: CommandLine::go_loader(&self.loader_path),
            engine_timeout: self.engine_timeout_secs.map(Duration::from_secs),
            ..RunnerSettings::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, level_for(cli.verbosity));
    info!(version = multiloader_core::VERSION, "Starting multi-loader");

    let config = MultiLoaderConfig::from_file(&cli.multi_loader_config)
        .context("Failed to read multi-loader configuration")?;

    let executor: Arc<dyn RemoteExecutor> = Arc::new(SshExecutor::new(SshConfig::default()));
    let discovery: Arc<dyn ClusterDiscovery> = Arc::new(KubectlDiscovery::new());
    let mut orchestrator = StudyOrchestrator::new(config, cli.settings(), discovery, executor)
        .await
        .context("Multi-loader setup failed")?;

    orchestrator.run_dry_run().await.context("Dry run aborted")?;
    if !orchestrator.dry_run_success() {
        error!("Dry run failed, check the loader.log files under dry_run/");
        bail!("dry run failed");
    }
    info!("Dry run completed successfully");

    let passed = orchestrator
        .run_actual()
        .await
        .context("Experiment run aborted")?;
    if !passed {
        warn!("Some experiments failed, check their loader.log files");
    }
    info!("All experiments completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["multi-loader"]).unwrap();
        assert_eq!(
            cli.multi_loader_config,
            PathBuf::from("tools/multi_loader/multi_loader_config.json")
        );
        assert_eq!(cli.verbosity, Verbosity::Info);
        assert!(!cli.iat_generation);

        let settings = cli.settings();
        assert_eq!(settings.engine, CommandLine::new("go", ["run", "cmd/loader.go"]));
        assert!(settings.engine_timeout.is_none());
    }

    #[test]
    fn test_flags_flow_into_settings() {
        let cli = Cli::try_parse_from([
            "multi-loader",
            "--verbosity",
            "debug",
            "--iat-generation",
            "--generated",
            "--loader-path",
            "cmd/test/test.go",
            "--engine-timeout-secs",
            "600",
        ])
        .unwrap();

        let settings = cli.settings();
        assert_eq!(settings.defaults.verbosity, Verbosity::Debug);
        assert!(settings.defaults.iat_generation);
        assert!(settings.defaults.generated);
        assert_eq!(settings.engine.args, vec!["run", "cmd/test/test.go"]);
        assert_eq!(settings.engine_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_invalid_verbosity_rejected() {
        assert!(Cli::try_parse_from(["multi-loader", "--verbosity", "loud"]).is_err());
    }
}
