//! Stage runner backed by real processes.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{StageDefinition, StageResult, StageRunner};

/// Runs stages as child processes rooted at the app directory.
#[derive(Debug, Clone)]
pub struct ProcessStageRunner {
    app_dir: PathBuf,
}

impl ProcessStageRunner {
    /// Creates a runner for stages of the app in `app_dir`.
    #[must_use]
    pub fn new(app_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_dir: app_dir.into(),
        }
    }

    /// Returns the app directory.
    #[must_use]
    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }
}

fn surface_output(stage: &str, stdout: &str, stderr: &str) {
    for line in stdout.lines() {
        info!(stage = %stage, "{line}");
    }
    for line in stderr.lines() {
        warn!(stage = %stage, "{line}");
    }
}

#[async_trait]
impl StageRunner for ProcessStageRunner {
    async fn run_stage(&self, stage: &StageDefinition) -> StageResult {
        let started_at = Utc::now();
        let cwd = stage.resolve_working_dir(&self.app_dir);

        debug!(
            stage = %stage.name,
            command = %stage.command,
            args = ?stage.args,
            cwd = %cwd.display(),
            "Starting stage"
        );

        let output = Command::new(&stage.command)
            .args(&stage.args)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                surface_output(&stage.name, &stdout, &stderr);

                let result = StageResult::exited(
                    &stage.name,
                    started_at,
                    output.status.code(),
                    stdout,
                    stderr,
                );
                if result.is_success() {
                    info!(stage = %stage.name, duration_ms = result.duration_ms(), "Stage passed");
                } else {
                    warn!(stage = %stage.name, exit_code = ?result.exit_code, "Stage failed");
                }
                result
            }
            Err(error) => {
                warn!(stage = %stage.name, command = %stage.command, error = %error, "Stage could not be started");
                StageResult::launch_failed(&stage.name, started_at, error.to_string())
            }
        }
    }
}
