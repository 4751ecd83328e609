//! Pre/post hook scripts.

use std::process::Stdio;

use tokio::process::Command;
use tracing::info;

use crate::error::{LoaderError, Result};

/// Run `script` with `/bin/sh`. An empty path is a no-op.
///
/// A script that cannot start or exits non-zero stops the run.
pub async fn run_script(script: &str) -> Result<()> {
    if script.trim().is_empty() {
        return Ok(());
    }
    info!(script = %script, "Running script");

    let output = Command::new("/bin/sh")
        .arg(script)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| LoaderError::config(format!("cannot run script {}: {}", script, e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        info!(script = %script, "{}", stdout.trim_end());
    }
    if !output.status.success() {
        return Err(LoaderError::config(format!(
            "script {} exited with status {}: {}",
            script,
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_script_is_noop() {
        run_script("").await.unwrap();
        run_script("   ").await.unwrap();
    }

    #[tokio::test]
    async fn test_script_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = dir.path().join("pre.sh");
        std::fs::write(&script, format!("echo hello\ntouch {}\n", marker.display())).unwrap();

        run_script(&script.to_string_lossy()).await.unwrap();
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_failing_script_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("post.sh");
        std::fs::write(&script, "echo broken >&2\nexit 4\n").unwrap();

        let err = run_script(&script.to_string_lossy()).await.unwrap_err();
        assert!(matches!(err, LoaderError::Configuration(_)));
        assert!(err.to_string().contains("broken"));
    }
}
