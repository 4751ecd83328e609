//! Execution of one sub-experiment as a subprocess of the load engine.
//!
//! Each attempt spawns the engine with the merged config written to a fixed
//! transient path. Stdout and stderr are drained by two spawned tasks that
//! are joined before the attempt's exit status is used. A failed first
//! attempt is retried once at debug verbosity.

pub mod log_stream;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::counters::COUNTERS;
use crate::domain::{RunOutcome, SubExperiment, Verbosity};
use crate::error::{ExecutionError, LoaderError, Result};
use crate::expander::ExpansionDefaults;
use crate::overlay::MergedConfiguration;

use log_stream::{LogClassifier, SharedLog, StreamKind};

/// Engine invocations per sub-experiment.
pub const MAX_ATTEMPTS: u32 = 2;

/// Written to `loader.log` between a failed attempt and its retry.
pub const RETRY_DIVIDER: &str =
    "==================================RETRYING==================================";

pub const DEFAULT_TEMP_CONFIG_PATH: &str = "tools/multi_loader/current_running_config.json";
pub const DEFAULT_LOADER_PATH: &str = "cmd/loader.go";

/// A program plus its leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `go run <loader_path>`
    pub fn go_loader(loader_path: &str) -> Self {
        Self::new("go", ["run", loader_path])
    }

    /// `make clean`
    pub fn make_clean() -> Self {
        Self::new("make", ["clean"])
    }
}

/// Orchestrator-wide execution settings, passed to components at construction.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub defaults: ExpansionDefaults,
    pub engine: CommandLine,
    pub temp_config_path: PathBuf,
    /// Run after every sub-experiment; `None` skips the step.
    pub clean_command: Option<CommandLine>,
    /// Per-attempt deadline; the engine is killed when it expires.
    pub engine_timeout: Option<Duration>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            defaults: ExpansionDefaults::default(),
            engine: CommandLine::go_loader(DEFAULT_LOADER_PATH),
            temp_config_path: PathBuf::from(DEFAULT_TEMP_CONFIG_PATH),
            clean_command: Some(CommandLine::make_clean()),
            engine_timeout: None,
        }
    }
}

pub struct ExperimentRunner {
    settings: RunnerSettings,
    classifier: Arc<LogClassifier>,
}

impl ExperimentRunner {
    pub fn new(settings: RunnerSettings) -> Result<Self> {
        let classifier = LogClassifier::new()
            .map_err(|e| LoaderError::config(format!("invalid log pattern: {}", e)))?;
        Ok(Self {
            settings,
            classifier: Arc::new(classifier),
        })
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Create the experiment directory and write the merged config to the
    /// transient path. Returns the experiment directory.
    pub fn prepare(&self, experiment: &SubExperiment, merged: &MergedConfiguration) -> Result<PathBuf> {
        info!(experiment = %experiment.name, "Preparing experiment");
        let dir = experiment.experiment_dir();
        std::fs::create_dir_all(&dir)?;
        merged.write_to(&self.settings.temp_config_path)?;
        Ok(dir)
    }

    /// Run the engine for `experiment`, retrying once on failure.
    ///
    /// Attempt failures are reported in the returned outcome. An
    /// [`LoaderError::Execution`] means `loader.log` could not be written;
    /// it fails this sub-experiment only.
    pub async fn run(&self, experiment: &SubExperiment) -> Result<RunOutcome> {
        info!(experiment = %experiment.name, "Running experiment");

        let log_path = experiment.log_path();
        let log = open_log(&log_path).await.map_err(ExecutionError::from)?;

        let mut verbosity = experiment.verbosity;
        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(experiment, verbosity, &log).await {
                Ok(()) => {
                    info!(experiment = %experiment.name, attempt, "Completed experiment");
                    return Ok(RunOutcome::success(attempt));
                }
                Err(e) => {
                    error!(experiment = %experiment.name, attempt, error = %e, "Experiment failed");
                    log_stream::append_line(
                        &log,
                        &format!("Experiment failed: {}. Error: {}", experiment.name, e),
                    )
                    .await
                    .map_err(ExecutionError::from)?;
                    last_error = e.to_string();

                    if attempt < MAX_ATTEMPTS {
                        info!(experiment = %experiment.name, "Retrying experiment");
                        COUNTERS.inc_attempts_retried();
                        log_stream::append_line(&log, RETRY_DIVIDER)
                            .await
                            .map_err(ExecutionError::from)?;
                        verbosity = Verbosity::Debug;
                    }
                }
            }
        }

        error!(log = %log_path.display(), "Check log file for more information");
        Ok(RunOutcome::failure(MAX_ATTEMPTS, last_error))
    }

    async fn attempt(
        &self,
        experiment: &SubExperiment,
        verbosity: Verbosity,
        log: &SharedLog,
    ) -> std::result::Result<(), ExecutionError> {
        let mut child = Command::new(&self.settings.engine.program)
            .args(&self.settings.engine.args)
            .arg(format!("--config={}", self.settings.temp_config_path.display()))
            .arg(format!("--verbosity={}", verbosity))
            .arg(format!("--iatGeneration={}", experiment.iat_generation))
            .arg(format!("--generated={}", experiment.generated))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ExecutionError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("engine stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("engine stderr was not captured"))?;

        let out_task = tokio::spawn(log_stream::pump(
            stdout,
            StreamKind::Stdout,
            self.classifier.clone(),
            log.clone(),
        ));
        let err_task = tokio::spawn(log_stream::pump(
            stderr,
            StreamKind::Stderr,
            self.classifier.clone(),
            log.clone(),
        ));

        let status = match self.settings.engine_timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(experiment = %experiment.name, limit_secs = limit.as_secs(), "Engine deadline expired, killing");
                    // Descendants may still hold the pipes open.
                    out_task.abort();
                    err_task.abort();
                    if let Err(e) = child.kill().await {
                        error!(experiment = %experiment.name, error = %e, "Failed to kill engine");
                    }
                    return Err(ExecutionError::TimedOut {
                        limit_secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait().await?,
        };

        let (out_res, err_res) = tokio::join!(out_task, err_task);
        out_res.map_err(std::io::Error::other)??;
        err_res.map_err(std::io::Error::other)??;

        if status.success() {
            Ok(())
        } else {
            Err(ExecutionError::NonZeroExit {
                code: status.code().unwrap_or(-1),
            })
        }
    }

    /// Run the clean step and remove the transient config. Failures are logged.
    pub async fn cleanup(&self) {
        info!("Running cleanup");
        if let Some(clean) = &self.settings.clean_command {
            match Command::new(&clean.program)
                .args(&clean.args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .await
            {
                Ok(output) if output.status.success() => {}
                Ok(output) => error!(
                    program = %clean.program,
                    code = output.status.code().unwrap_or(-1),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Clean step failed"
                ),
                Err(e) => error!(program = %clean.program, error = %e, "Clean step could not start"),
            }
        }
        remove_if_present(&self.settings.temp_config_path);
        info!("Cleanup completed");
    }
}

async fn open_log(path: &Path) -> std::io::Result<SharedLog> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await?;
    Ok(Arc::new(Mutex::new(file)))
}

fn remove_if_present(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove transient config");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::loader_config::OUTPUT_PATH_PREFIX;
    use crate::domain::ConfigOverrides;

    fn experiment(out: &Path) -> SubExperiment {
        let mut config = ConfigOverrides::new();
        config.set(
            OUTPUT_PATH_PREFIX,
            out.join("s1/ts_t/t").to_string_lossy().into_owned(),
        );
        SubExperiment {
            name: "s1_t".to_string(),
            config,
            output_dir: out.to_string_lossy().into_owned(),
            verbosity: Verbosity::Info,
            iat_generation: false,
            generated: true,
        }
    }

    fn settings(dir: &Path, script: &str) -> RunnerSettings {
        let script_path = dir.join("engine.sh");
        std::fs::write(&script_path, script).unwrap();
        RunnerSettings {
            engine: CommandLine::new("sh", [script_path.to_string_lossy().into_owned()]),
            temp_config_path: dir.join("current_running_config.json"),
            clean_command: None,
            ..RunnerSettings::default()
        }
    }

    #[test]
    fn test_default_settings() {
        let s = RunnerSettings::default();
        assert_eq!(s.engine, CommandLine::new("go", ["run", "cmd/loader.go"]));
        assert_eq!(s.clean_command, Some(CommandLine::new("make", ["clean"])));
        assert_eq!(s.temp_config_path, PathBuf::from(DEFAULT_TEMP_CONFIG_PATH));
        assert!(s.engine_timeout.is_none());
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_passes_flags() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ExperimentRunner::new(settings(dir.path(), "echo \"$@\"\n")).unwrap();
        let exp = experiment(dir.path());

        let outcome = runner.run(&exp).await.unwrap();
        assert_eq!(outcome, RunOutcome::success(1));

        let log = std::fs::read_to_string(exp.log_path()).unwrap();
        assert!(log.contains("--verbosity=info"));
        assert!(log.contains("--iatGeneration=false"));
        assert!(log.contains("--generated=true"));
        assert!(log.contains("current_running_config.json"));
    }

    #[tokio::test]
    async fn test_two_failures_exhaust_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let runner =
            ExperimentRunner::new(settings(dir.path(), "echo \"$@\"\necho oops >&2\nexit 3\n"))
                .unwrap();
        let exp = experiment(dir.path());

        let outcome = runner.run(&exp).await.unwrap();
        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts, MAX_ATTEMPTS);
        assert!(outcome.last_error.unwrap().contains("status 3"));

        let log = std::fs::read_to_string(exp.log_path()).unwrap();
        assert_eq!(log.matches(RETRY_DIVIDER).count(), 1);
        assert_eq!(log.matches("oops").count(), 2);
        assert!(log.contains("--verbosity=debug"));
        assert!(log.contains("Experiment failed: s1_t. Error:"));
    }

    #[tokio::test]
    async fn test_missing_program_is_attempt_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path(), "");
        s.engine = CommandLine::new("/nonexistent/engine", Vec::<String>::new());
        let runner = ExperimentRunner::new(s).unwrap();

        let outcome = runner.run(&experiment(dir.path())).await.unwrap();
        assert!(!outcome.succeeded);
        assert!(outcome.last_error.unwrap().contains("spawn"));
    }

    #[tokio::test]
    async fn test_deadline_kills_engine() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path(), "exec sleep 30\n");
        s.engine_timeout = Some(Duration::from_millis(200));
        let runner = ExperimentRunner::new(s).unwrap();

        let outcome = runner.run(&experiment(dir.path())).await.unwrap();
        assert!(!outcome.succeeded);
        assert!(outcome.last_error.unwrap().contains("deadline"));
    }

    #[tokio::test]
    async fn test_non_utf8_output_does_not_fail_run() {
        let dir = tempfile::tempdir().unwrap();
        let script = "printf 'fn=caf\\351\\n'\necho 'level=info msg=\"Number of successful invocations: 5\"'\nexit 0\n";
        let runner = ExperimentRunner::new(settings(dir.path(), script)).unwrap();
        let exp = experiment(dir.path());

        let outcome = runner.run(&exp).await.unwrap();
        assert_eq!(outcome, RunOutcome::success(1));

        let log = std::fs::read(exp.log_path()).unwrap();
        assert!(log.starts_with(b"fn=caf\xe9\n"));
        let text = String::from_utf8_lossy(&log);
        assert!(text.contains("Number of successful invocations: 5"));
        assert!(!text.contains("Experiment failed"));
    }

    #[tokio::test]
    async fn test_large_output_on_both_streams_fully_drained() {
        let dir = tempfile::tempdir().unwrap();
        // 4000 lines of ~30 bytes per stream, well past a pipe buffer.
        let script = "i=1\nwhile [ $i -le 4000 ]; do\n  echo \"stdout line $i padding-padding\"\n  echo \"stderr line $i padding-padding\" >&2\n  i=$((i+1))\ndone\necho 'stdout done'\necho 'stderr done' >&2\nexit 0\n";
        let runner = ExperimentRunner::new(settings(dir.path(), script)).unwrap();
        let exp = experiment(dir.path());

        let outcome = runner.run(&exp).await.unwrap();
        assert_eq!(outcome, RunOutcome::success(1));

        let log = std::fs::read_to_string(exp.log_path()).unwrap();
        assert!(log.len() > 2 * 64 * 1024);
        assert_eq!(log.lines().filter(|l| l.starts_with("stdout line ")).count(), 4000);
        assert_eq!(log.lines().filter(|l| l.starts_with("stderr line ")).count(), 4000);
        assert!(log.lines().any(|l| l == "stdout line 4000 padding-padding"));
        assert!(log.lines().any(|l| l == "stderr line 4000 padding-padding"));
        assert!(log.lines().any(|l| l == "stdout done"));
        assert!(log.lines().any(|l| l == "stderr done"));
    }

    #[tokio::test]
    async fn test_unwritable_log_is_non_fatal_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ExperimentRunner::new(settings(dir.path(), "exit 0\n")).unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let err = runner.run(&experiment(&blocker)).await.unwrap_err();
        assert!(matches!(err, LoaderError::Execution(ExecutionError::Io(_))));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_deadline_returns_while_descendant_holds_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path(), "sleep 30 &\nsleep 30\n");
        s.engine_timeout = Some(Duration::from_millis(200));
        let runner = ExperimentRunner::new(s).unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            runner.run(&experiment(dir.path())),
        )
        .await
        .expect("run should not wait for the orphaned sleep")
        .unwrap();
        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts, MAX_ATTEMPTS);
        assert!(outcome.last_error.unwrap().contains("deadline"));
    }

    #[tokio::test]
    async fn test_cleanup_removes_transient_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path(), "");
        s.clean_command = Some(CommandLine::new("true", Vec::<String>::new()));
        let runner = ExperimentRunner::new(s).unwrap();

        let exp = experiment(dir.path());
        let merged =
            crate::overlay::merge(&Default::default(), &exp.config).unwrap();
        let exp_dir = runner.prepare(&exp, &merged).unwrap();
        assert!(exp_dir.is_dir());
        assert!(runner.settings().temp_config_path.exists());

        runner.cleanup().await;
        assert!(!runner.settings().temp_config_path.exists());
        // Second cleanup is a no-op.
        runner.cleanup().await;
    }
}
