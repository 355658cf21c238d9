//! Result of a single stage run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of running one stage once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub name: String,
    /// Process exit code; `None` if the process never started or was killed
    /// by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    #[serde(default)]
    pub stdout: String,
    /// Captured standard error.
    #[serde(default)]
    pub stderr: String,
    /// Why the process could not be started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_error: Option<String>,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a result for a process that ran to completion.
    #[must_use]
    pub fn exited(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        exit_code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            launch_error: None,
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Creates a result for a process that could not be started.
    #[must_use]
    pub fn launch_failed(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            launch_error: Some(error.into()),
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Returns true if the stage exited with status zero.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.launch_error.is_none() && self.exit_code == Some(0)
    }
}
