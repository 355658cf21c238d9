//! Test and build stages declared in the app manifest.
//!
//! A stage is an external command. Stages of one phase run concurrently
//! in a [`StagePool`]; the pool only reports whether any of them failed.

mod pool;
mod process;
mod result;

pub use pool::{PoolOutcome, StagePool};
pub use process::ProcessStageRunner;
pub use result::StageResult;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The two stage phases of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagePhase {
    /// The manifest's `tests` list.
    Tests,
    /// The manifest's `build` list.
    Build,
}

impl fmt::Display for StagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tests => write!(f, "tests"),
            Self::Build => write!(f, "build"),
        }
    }
}

/// A runnable step declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Display name of the stage.
    pub name: String,
    /// Executable to run.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; relative paths resolve against the app directory.
    #[serde(
        default,
        rename = "workingDirectory",
        alias = "working_dir",
        skip_serializing_if = "Option::is_none"
    )]
    pub working_dir: Option<PathBuf>,
}

impl StageDefinition {
    /// Creates a new stage definition.
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Sets the arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Resolves the directory the stage runs in.
    #[must_use]
    pub fn resolve_working_dir(&self, app_dir: &Path) -> PathBuf {
        match &self.working_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => app_dir.join(dir),
            None => app_dir.to_path_buf(),
        }
    }
}

/// Executes a single stage.
///
/// The pool has no knowledge of what a stage does; runners decide how a
/// [`StageDefinition`] becomes a [`StageResult`].
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Runs the stage to completion.
    ///
    /// Launch failures are reported in the returned result, never as a panic.
    async fn run_stage(&self, stage: &StageDefinition) -> StageResult;
}
