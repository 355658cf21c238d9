//! The coordinating loop of watch mode.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::reload::ReloadSignal;
use super::state::{is_expected, transition, Action, WatchEvent, WatcherState};
use crate::catalog::CatalogUploader;
use crate::errors::PushError;

/// Capacity of the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Default quiet period between a change and the push it triggers.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Starts one push.
#[async_trait]
pub trait PushLauncher: Send + Sync {
    /// Runs a full push and returns the published URI.
    async fn launch(&self) -> Result<String, PushError>;
}

/// Pushes one app through a [`CatalogUploader`].
#[derive(Debug)]
pub struct UploaderLauncher {
    uploader: Arc<CatalogUploader>,
    catalog_url: String,
    timeout_seconds: u64,
    manifest_path: PathBuf,
    skip_tests: bool,
}

impl UploaderLauncher {
    /// Creates a launcher pushing the manifest at `manifest_path`.
    #[must_use]
    pub fn new(
        uploader: Arc<CatalogUploader>,
        catalog_url: impl Into<String>,
        manifest_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            uploader,
            catalog_url: catalog_url.into(),
            timeout_seconds: 180,
            manifest_path: manifest_path.into(),
            skip_tests: false,
        }
    }

    /// Sets the per-attempt upload timeout.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Skips the test phase on every push.
    #[must_use]
    pub fn with_skip_tests(mut self, skip: bool) -> Self {
        self.skip_tests = skip;
        self
    }
}

#[async_trait]
impl PushLauncher for UploaderLauncher {
    async fn launch(&self) -> Result<String, PushError> {
        self.uploader
            .push(
                &self.catalog_url,
                self.timeout_seconds,
                &self.manifest_path,
                self.skip_tests,
            )
            .await
    }
}

/// Runs a push and fires the reload signal, logging failures.
pub async fn push_and_reload(launcher: &dyn PushLauncher, reload: &dyn ReloadSignal) {
    match launcher.launch().await {
        Ok(uri) => reload.reload(Some(&uri)).await,
        Err(err) => {
            error!(error = %err, "Push failed, waiting for the next change");
            reload.reload(None).await;
        }
    }
}

/// Turns a stream of file changes into pushes.
///
/// Changes arriving while waiting start a debounce delay; the push starts
/// when it runs out. Changes during a push are folded into exactly one
/// follow-up push. Only one push is ever in flight.
///
/// File watchers, the delay timer and push tasks all report through one
/// channel. The loop ends once the external senders are dropped and no timer
/// or push is running.
pub struct WatchCoalescer {
    launcher: Arc<dyn PushLauncher>,
    reload: Arc<dyn ReloadSignal>,
    debounce: Duration,
    state: WatcherState,
    events: mpsc::Receiver<WatchEvent>,
    feedback: mpsc::WeakSender<WatchEvent>,
}

impl WatchCoalescer {
    /// Creates a coalescer and the sender file watchers report changes to.
    #[must_use]
    pub fn new(
        launcher: Arc<dyn PushLauncher>,
        reload: Arc<dyn ReloadSignal>,
    ) -> (Self, mpsc::Sender<WatchEvent>) {
        let (sender, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let coalescer = Self {
            launcher,
            reload,
            debounce: DEFAULT_DEBOUNCE,
            state: WatcherState::Waiting,
            events,
            feedback: sender.downgrade(),
        };
        (coalescer, sender)
    }

    /// Sets the debounce delay.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Processes events until the channel closes; returns the final state.
    pub async fn run(mut self) -> WatcherState {
        info!(debounce_ms = self.debounce.as_millis(), "Watching for changes");

        while let Some(event) = self.events.recv().await {
            self.handle(event);
        }

        debug!(state = %self.state, "Watch loop stopped");
        self.state
    }

    fn handle(&mut self, event: WatchEvent) {
        if !is_expected(self.state, event) {
            debug!(state = %self.state, event = ?event, "Ignoring unexpected event");
        }

        let (next, action) = transition(self.state, event);
        if next != self.state {
            debug!(from = %self.state, to = %next, event = ?event, "Watch state changed");
        }
        self.state = next;

        match action {
            Action::None => {}
            Action::ArmDelay => self.arm_delay(),
            Action::LaunchPush => self.launch_push(),
        }
    }

    fn arm_delay(&self) {
        let Some(sender) = self.feedback.upgrade() else {
            return;
        };
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let _ = sender.send(WatchEvent::DelayElapsed).await;
        });
    }

    fn launch_push(&self) {
        let Some(sender) = self.feedback.upgrade() else {
            return;
        };
        let launcher = Arc::clone(&self.launcher);
        let reload = Arc::clone(&self.reload);
        info!("Change detected, pushing");
        tokio::spawn(async move {
            let push = tokio::spawn(async move {
                push_and_reload(launcher.as_ref(), reload.as_ref()).await;
            });
            if let Err(err) = push.await {
                error!(error = %err, "Push task aborted, waiting for the next change");
            }
            let _ = sender.send(WatchEvent::PushCompleted).await;
        });
    }
}

impl std::fmt::Debug for WatchCoalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchCoalescer")
            .field("state", &self.state)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingReloadSignal, ScriptedLauncher};

    fn coalescer(
        launcher: &Arc<ScriptedLauncher>,
        reload: &Arc<RecordingReloadSignal>,
    ) -> (WatchCoalescer, mpsc::Sender<WatchEvent>) {
        let launcher: Arc<dyn PushLauncher> = launcher.clone();
        let reload: Arc<dyn ReloadSignal> = reload.clone();
        WatchCoalescer::new(launcher, reload)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_change_waits_for_debounce() {
        let launcher = Arc::new(ScriptedLauncher::new());
        let reload = Arc::new(RecordingReloadSignal::new());
        let (coalescer, sender) = coalescer(&launcher, &reload);
        let handle = tokio::spawn(coalescer.run());

        sender.send(WatchEvent::FileChanged).await.unwrap();
        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(launcher.launch_count(), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(launcher.launch_count(), 1);

        drop(sender);
        assert_eq!(handle.await.unwrap(), WatcherState::Waiting);
        assert_eq!(reload.uris(), vec![Some("http://catalog/app/1".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_during_debounce_do_not_restart_it() {
        let launcher = Arc::new(ScriptedLauncher::new());
        let reload = Arc::new(RecordingReloadSignal::new());
        let (coalescer, sender) = coalescer(&launcher, &reload);
        let handle = tokio::spawn(coalescer.run());

        sender.send(WatchEvent::FileChanged).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        sender.send(WatchEvent::FileChanged).await.unwrap();
        tokio::time::sleep(Duration::from_millis(41)).await;
        assert_eq!(launcher.launch_count(), 1);

        drop(sender);
        handle.await.unwrap();
        assert_eq!(launcher.launch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_during_push_yields_exactly_one_follow_up() {
        let launcher = Arc::new(ScriptedLauncher::new().with_duration(Duration::from_secs(1)));
        let reload = Arc::new(RecordingReloadSignal::new());
        let (coalescer, sender) = coalescer(&launcher, &reload);
        let handle = tokio::spawn(coalescer.run());

        sender.send(WatchEvent::FileChanged).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(launcher.launch_count(), 1);
        assert_eq!(launcher.in_flight(), 1);

        for _ in 0..10 {
            sender.send(WatchEvent::FileChanged).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(launcher.launch_count(), 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(launcher.launch_count(), 2);
        assert_eq!(launcher.max_in_flight(), 1);

        drop(sender);
        assert_eq!(handle.await.unwrap(), WatcherState::Waiting);
        assert_eq!(reload.uris().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_push_keeps_loop_running() {
        let launcher = Arc::new(ScriptedLauncher::new().with_failures(1));
        let reload = Arc::new(RecordingReloadSignal::new());
        let (coalescer, sender) = coalescer(&launcher, &reload);
        let handle = tokio::spawn(coalescer.run());

        sender.send(WatchEvent::FileChanged).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        sender.send(WatchEvent::FileChanged).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(launcher.launch_count(), 2);
        drop(sender);
        handle.await.unwrap();
        assert_eq!(
            reload.uris(),
            vec![None, Some("http://catalog/app/2".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_push_keeps_loop_running() {
        let launcher = Arc::new(ScriptedLauncher::new().with_panics(1));
        let reload = Arc::new(RecordingReloadSignal::new());
        let (coalescer, sender) = coalescer(&launcher, &reload);
        let handle = tokio::spawn(coalescer.run());

        sender.send(WatchEvent::FileChanged).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        sender.send(WatchEvent::FileChanged).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(launcher.launch_count(), 2);
        drop(sender);
        assert_eq!(handle.await.unwrap(), WatcherState::Waiting);
        assert_eq!(reload.uris(), vec![Some("http://catalog/app/2".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_waits_for_in_flight_push_before_stopping() {
        let launcher = Arc::new(ScriptedLauncher::new().with_duration(Duration::from_secs(3)));
        let reload = Arc::new(RecordingReloadSignal::new());
        let (coalescer, sender) = coalescer(&launcher, &reload);
        let handle = tokio::spawn(coalescer.run());

        sender.send(WatchEvent::FileChanged).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(launcher.in_flight(), 1);
        drop(sender);

        assert_eq!(handle.await.unwrap(), WatcherState::Waiting);
        assert_eq!(launcher.launch_count(), 1);
        assert_eq!(launcher.in_flight(), 0);
    }
}
