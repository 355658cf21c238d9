//! The push pipeline: manifest, stages, pack, retried upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use super::client::{CatalogClient, UploadRequest};
use super::retry::{decide, PushAttempt, RetryConfig, RetryDecision};
use crate::auth::TokenProvider;
use crate::config::AppixConfig;
use crate::errors::{AttemptError, PackError, PushError, StageFailure, TransientServerError};
use crate::events::{
    EventSink, NoOpEventSink, PUSH_ATTEMPT_FAILED, PUSH_FAILED, PUSH_PACKED, PUSH_STAGE_PHASE,
    PUSH_STARTED, PUSH_SUCCEEDED,
};
use crate::manifest::Manifest;
use crate::observability::push_span;
use crate::packaging::{Artifact, IgnoreRules, Packager, ZipPackager};
use crate::settings::DevelopmentSettings;
use crate::stages::{ProcessStageRunner, StageDefinition, StagePhase, StagePool, StageRunner};

/// Publishes an app to the catalog.
///
/// A push loads the manifest, runs the test and build phases, packs the app
/// and uploads the artifact. Only the upload (including token acquisition) is
/// retried; every earlier failure ends the push at once.
pub struct CatalogUploader {
    stage_pool: StagePool,
    tokens: Arc<TokenProvider>,
    packager: Arc<dyn Packager>,
    client: CatalogClient,
    events: Arc<dyn EventSink>,
    retry: RetryConfig,
}

impl CatalogUploader {
    /// Creates an uploader from its collaborators.
    #[must_use]
    pub fn new(
        runner: Arc<dyn StageRunner>,
        tokens: Arc<TokenProvider>,
        packager: Arc<dyn Packager>,
    ) -> Self {
        Self {
            stage_pool: StagePool::new(runner),
            tokens,
            packager,
            client: CatalogClient::default(),
            events: Arc::new(NoOpEventSink),
            retry: RetryConfig::default(),
        }
    }

    /// Creates an uploader for the app in `app_dir` using real processes,
    /// the identity provider and zip packaging.
    #[must_use]
    pub fn from_config(config: &AppixConfig, app_dir: &Path) -> Self {
        let http = reqwest::Client::new();
        let tokens = TokenProvider::from_config(config, http.clone());

        Self::new(
            Arc::new(ProcessStageRunner::new(app_dir)),
            Arc::new(tokens),
            Arc::new(ZipPackager::new()),
        )
        .with_client(CatalogClient::new(http))
        .with_retry(config.retry.clone())
    }

    /// Sets the HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: CatalogClient) -> Self {
        self.client = client;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the retry configuration.
    #[must_use]
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Pushes the app whose manifest is at `manifest_path`.
    ///
    /// Returns the URI the catalog published the app under.
    pub async fn push(
        &self,
        catalog_base_url: &str,
        timeout_seconds: u64,
        manifest_path: &Path,
        skip_tests: bool,
    ) -> Result<String, PushError> {
        let run_id = Uuid::new_v4().to_string();
        let manifest = match Manifest::load(manifest_path) {
            Ok(manifest) => manifest,
            Err(error) => {
                let error = PushError::from(error);
                self.report_failure(&run_id, &error).await;
                return Err(error);
            }
        };

        let span = push_span(&manifest.name, &run_id);
        let result = self
            .push_manifest(
                &run_id,
                &manifest,
                app_dir_of(manifest_path),
                catalog_base_url,
                Duration::from_secs(timeout_seconds),
                skip_tests,
            )
            .instrument(span)
            .await;

        match &result {
            Ok(uri) => {
                info!(app = %manifest.name, uri = %uri, "Uploaded");
                self.events
                    .emit(
                        PUSH_SUCCEEDED,
                        Some(json!({ "run_id": run_id, "app": manifest.name, "uri": uri })),
                    )
                    .await;
            }
            Err(error) => self.report_failure(&run_id, error).await,
        }
        result
    }

    async fn report_failure(&self, run_id: &str, error: &PushError) {
        warn!(run_id = %run_id, error = %error, "Push failed");
        self.events
            .emit(
                PUSH_FAILED,
                Some(json!({
                    "run_id": run_id,
                    "error": error.to_string(),
                    "status": error.last_status(),
                })),
            )
            .await;
    }

    async fn push_manifest(
        &self,
        run_id: &str,
        manifest: &Manifest,
        app_dir: PathBuf,
        catalog_base_url: &str,
        timeout: Duration,
        skip_tests: bool,
    ) -> Result<String, PushError> {
        self.events
            .emit(
                PUSH_STARTED,
                Some(json!({ "run_id": run_id, "app": manifest.name, "skip_tests": skip_tests })),
            )
            .await;

        if skip_tests {
            debug!("Skipping tests");
        } else {
            self.run_phase(StagePhase::Tests, &manifest.tests).await?;
        }
        self.run_phase(StagePhase::Build, &manifest.build).await?;

        let artifact = self.pack(&app_dir).await?;
        self.events
            .emit(
                PUSH_PACKED,
                Some(json!({ "run_id": run_id, "bytes": artifact.len() })),
            )
            .await;

        let session_id = match DevelopmentSettings::read_optional(&app_dir) {
            Ok(settings) => settings.map(|s| s.session_id),
            Err(error) => {
                warn!(error = %error, "Ignoring unreadable development settings");
                None
            }
        };

        let request = UploadRequest {
            url: catalog_base_url,
            app_name: &manifest.name,
            session_id: session_id.as_deref(),
            artifact: &artifact,
            timeout,
        };
        self.upload_with_retry(run_id, request).await
    }

    async fn run_phase(
        &self,
        phase: StagePhase,
        stages: &[StageDefinition],
    ) -> Result<(), StageFailure> {
        info!(phase = %phase, count = stages.len(), "Running {phase}");
        let outcome = self.stage_pool.run(stages).await;
        let failed = outcome.failed_stages();

        self.events
            .emit(
                PUSH_STAGE_PHASE,
                Some(json!({ "phase": phase, "failed": failed })),
            )
            .await;

        if failed.is_empty() {
            Ok(())
        } else {
            Err(StageFailure::new(phase, failed))
        }
    }

    async fn pack(&self, app_dir: &Path) -> Result<Artifact, PackError> {
        let rules = IgnoreRules::load(app_dir);
        let path = self
            .packager
            .pack(app_dir, &|relative: &Path| rules.should_include(relative))
            .await?;
        Ok(Artifact::take(path)?)
    }

    async fn upload_with_retry(
        &self,
        run_id: &str,
        request: UploadRequest<'_>,
    ) -> Result<String, PushError> {
        let mut attempts: Vec<PushAttempt> = Vec::new();

        loop {
            match decide(&attempts, &self.retry) {
                RetryDecision::Done(uri) => return Ok(uri),
                RetryDecision::GiveUp(cause) => {
                    return Err(PushError::Exhausted {
                        attempts: attempts.len(),
                        cause,
                    })
                }
                RetryDecision::Retry(delay) if delay.is_zero() => {}
                RetryDecision::Retry(delay) => {
                    debug!(delay_ms = delay.as_millis(), "Waiting before next attempt");
                    tokio::time::sleep(delay).await;
                }
            }

            let index = attempts.len() + 1;
            let started = Instant::now();
            let result = self.attempt(request).await;
            let elapsed = started.elapsed();

            let attempt = match result {
                Ok(uri) => PushAttempt::succeeded(index, uri, elapsed),
                Err(cause) => {
                    warn!(attempt = index, error = %cause, "Upload attempt failed");
                    self.events
                        .emit(
                            PUSH_ATTEMPT_FAILED,
                            Some(json!({
                                "run_id": run_id,
                                "attempt": index,
                                "error": cause.to_string(),
                            })),
                        )
                        .await;
                    PushAttempt::failed(index, cause, elapsed)
                }
            };
            attempts.push(attempt);
        }
    }

    async fn attempt(&self, request: UploadRequest<'_>) -> Result<String, AttemptError> {
        let token = self.tokens.token().await?;
        match self.client.upload(request, &token).await {
            Ok(uri) => Ok(uri),
            Err(error) => {
                if matches!(error, TransientServerError::Status { status: 401, .. }) {
                    self.tokens.invalidate().await;
                }
                Err(error.into())
            }
        }
    }
}

impl std::fmt::Debug for CatalogUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogUploader")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn app_dir_of(manifest_path: &Path) -> PathBuf {
    match manifest_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
