//! Scripted collaborators for testing pushes and watch mode.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::auth::{TokenResponse, TokenSource};
use crate::errors::{AttemptError, AuthError, PackError, PushError, TransientServerError};
use crate::packaging::{IncludePredicate, Packager, ARTIFACT_FILE_NAME};
use crate::stages::{StageDefinition, StageResult, StageRunner};
use crate::watch::{PushLauncher, ReloadSignal};

/// A stage runner that never spawns processes.
///
/// Stages succeed unless configured otherwise by name.
#[derive(Debug, Default)]
pub struct ScriptedStageRunner {
    exit_codes: HashMap<String, i32>,
    delays: HashMap<String, Duration>,
    launch_failures: Vec<String>,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedStageRunner {
    /// Creates a runner where every stage exits 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes stage `name` exit with `code`.
    #[must_use]
    pub fn with_exit_code(mut self, name: impl Into<String>, code: i32) -> Self {
        self.exit_codes.insert(name.into(), code);
        self
    }

    /// Makes stage `name` take `delay` before finishing.
    #[must_use]
    pub fn with_delay(mut self, name: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(name.into(), delay);
        self
    }

    /// Makes stage `name` fail to start.
    #[must_use]
    pub fn with_launch_failure(mut self, name: impl Into<String>) -> Self {
        self.launch_failures.push(name.into());
        self
    }

    /// Number of stages run so far.
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().len()
    }

    /// Names of the stages run so far, in start order.
    #[must_use]
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl StageRunner for ScriptedStageRunner {
    async fn run_stage(&self, stage: &StageDefinition) -> StageResult {
        let started_at = Utc::now();
        self.invocations.lock().push(stage.name.clone());

        if let Some(delay) = self.delays.get(&stage.name) {
            tokio::time::sleep(*delay).await;
        }

        if self.launch_failures.contains(&stage.name) {
            return StageResult::launch_failed(&stage.name, started_at, "scripted launch failure");
        }

        let code = self.exit_codes.get(&stage.name).copied().unwrap_or(0);
        StageResult::exited(&stage.name, started_at, Some(code), "", "")
    }
}

/// A packager that writes fixed bytes instead of archiving the app.
#[derive(Debug)]
pub struct StaticPackager {
    bytes: Vec<u8>,
    output_root: PathBuf,
    packed: Mutex<Vec<Vec<PathBuf>>>,
    fail: bool,
}

impl StaticPackager {
    /// Creates a packager producing `bytes` below the system temp directory.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            output_root: std::env::temp_dir(),
            packed: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// Creates a packager whose every call fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    /// Writes artifacts below `root` instead of the system temp directory.
    #[must_use]
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    /// Number of pack calls.
    #[must_use]
    pub fn pack_count(&self) -> usize {
        self.packed.lock().len()
    }

    /// Relative paths the predicate accepted, per call.
    #[must_use]
    pub fn included(&self) -> Vec<Vec<PathBuf>> {
        self.packed.lock().clone()
    }
}

fn walk(root: &Path, dir: &Path, include: &IncludePredicate<'_>, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(Result::ok).map(|e| e.path()).collect();
    paths.sort();
    for path in paths {
        let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        if !include(relative.as_path()) {
            continue;
        }
        if path.is_dir() {
            walk(root, &path, include, out);
        } else {
            out.push(relative);
        }
    }
}

#[async_trait]
impl Packager for StaticPackager {
    async fn pack(
        &self,
        app_dir: &Path,
        should_include: &IncludePredicate<'_>,
    ) -> Result<PathBuf, PackError> {
        let mut included = Vec::new();
        walk(app_dir, app_dir, should_include, &mut included);
        self.packed.lock().push(included);

        if self.fail {
            return Err(PackError::Archive("scripted pack failure".to_string()));
        }

        let dir = self.output_root.join(format!("appix-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(ARTIFACT_FILE_NAME);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// A token source handing out long-lived tokens and counting refreshes.
#[derive(Debug)]
pub struct StaticTokenSource {
    lifetime_seconds: i64,
    refreshes: AtomicUsize,
    fail: bool,
}

impl StaticTokenSource {
    /// Creates a source issuing tokens valid for one hour.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lifetime_seconds: 3600,
            refreshes: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// Creates a source whose refreshes are always rejected.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Sets the lifetime of issued tokens.
    #[must_use]
    pub fn with_lifetime_seconds(mut self, seconds: i64) -> Self {
        self.lifetime_seconds = seconds;
        self
    }

    /// Number of refresh calls.
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl Default for StaticTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(AuthError::Status {
                status: 400,
                body: "INVALID_REFRESH_TOKEN".to_string(),
            });
        }
        Ok(TokenResponse {
            access_token: format!("access-{n}"),
            expires_in: Some(self.lifetime_seconds),
            expires_at: None,
            refresh_token: None,
            token_type: Some("Bearer".to_string()),
        })
    }
}

#[derive(Debug, Default)]
struct LaunchCounters {
    launches: usize,
    in_flight: usize,
    max_in_flight: usize,
}

/// A push launcher that records launches and takes a configurable time.
///
/// Successful launches return `http://catalog/app/{n}` where `n` is the
/// 1-based launch number.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    duration: Duration,
    failures: usize,
    panics: usize,
    counters: Mutex<LaunchCounters>,
}

impl ScriptedLauncher {
    /// Creates a launcher whose pushes finish at once and succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every push take `duration`.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Makes the first `count` pushes fail.
    #[must_use]
    pub fn with_failures(mut self, count: usize) -> Self {
        self.failures = count;
        self
    }

    /// Makes the first `count` pushes panic.
    #[must_use]
    pub fn with_panics(mut self, count: usize) -> Self {
        self.panics = count;
        self
    }

    /// Number of pushes started.
    #[must_use]
    pub fn launch_count(&self) -> usize {
        self.counters.lock().launches
    }

    /// Number of pushes currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.counters.lock().in_flight
    }

    /// Highest number of pushes that ran at the same time.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.counters.lock().max_in_flight
    }
}

#[async_trait]
impl PushLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<String, PushError> {
        let n = {
            let mut counters = self.counters.lock();
            counters.launches += 1;
            counters.in_flight += 1;
            counters.max_in_flight = counters.max_in_flight.max(counters.in_flight);
            counters.launches
        };

        if !self.duration.is_zero() {
            tokio::time::sleep(self.duration).await;
        }
        self.counters.lock().in_flight -= 1;

        assert!(n > self.panics, "scripted push panic");
        if n <= self.failures {
            return Err(PushError::Exhausted {
                attempts: 1,
                cause: AttemptError::Server(TransientServerError::Status {
                    status: 503,
                    messages: vec!["unavailable".to_string()],
                }),
            });
        }
        Ok(format!("http://catalog/app/{n}"))
    }
}

/// A reload signal that records every call.
#[derive(Debug, Default)]
pub struct RecordingReloadSignal {
    uris: Mutex<Vec<Option<String>>>,
}

impl RecordingReloadSignal {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The URIs passed to each reload, in order.
    #[must_use]
    pub fn uris(&self) -> Vec<Option<String>> {
        self.uris.lock().clone()
    }
}

#[async_trait]
impl ReloadSignal for RecordingReloadSignal {
    async fn reload(&self, uri: Option<&str>) {
        self.uris.lock().push(uri.map(str::to_string));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_runner_defaults_to_success() {
        let runner = ScriptedStageRunner::new().with_exit_code("lint", 2);

        let ok = runner.run_stage(&StageDefinition::new("unit", "x")).await;
        let failed = runner.run_stage(&StageDefinition::new("lint", "x")).await;

        assert!(ok.is_success());
        assert_eq!(failed.exit_code, Some(2));
        assert_eq!(runner.invocations(), vec!["unit", "lint"]);
    }

    #[tokio::test]
    async fn test_static_packager_writes_bytes() {
        let app = tempfile::tempdir().unwrap();
        std::fs::write(app.path().join("index.html"), "x").unwrap();
        let packager = StaticPackager::new(b"zip".to_vec());

        let path = packager.pack(app.path(), &|_: &Path| true).await.unwrap();

        assert_eq!(std::fs::read(path).unwrap(), b"zip");
        assert_eq!(packager.included(), vec![vec![PathBuf::from("index.html")]]);
    }

    #[tokio::test]
    async fn test_static_token_source_counts() {
        let source = StaticTokenSource::new();
        let response = source.refresh("secret").await.unwrap();

        assert_eq!(response.access_token, "access-1");
        assert_eq!(source.refresh_count(), 1);
        assert!(StaticTokenSource::rejecting().refresh("secret").await.is_err());
    }
}
