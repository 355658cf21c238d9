//! Watch mode: push on every change of the app directory.
//!
//! One push runs immediately. After that, file changes feed a
//! [`WatchCoalescer`], which debounces them and never runs two pushes at
//! once.

mod coalescer;
mod fs;
mod reload;
mod state;

pub use coalescer::{
    push_and_reload, PushLauncher, UploaderLauncher, WatchCoalescer, DEFAULT_DEBOUNCE,
    EVENT_CHANNEL_CAPACITY,
};
pub use fs::{is_relevant, watch_directory};
pub use reload::{reload_signal_for, LoggingReloadSignal, NoOpReloadSignal, ReloadSignal};
pub use state::{is_expected, transition, Action, WatchEvent, WatcherState};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::errors::WatchError;
use crate::packaging::IgnoreRules;

/// Pushes the app in `app_dir` once, then again on every change.
///
/// Runs until the file watcher stops. Push failures are logged and never end
/// the loop.
pub async fn watch_app(
    app_dir: &Path,
    launcher: Arc<dyn PushLauncher>,
    reload: Arc<dyn ReloadSignal>,
    debounce: Duration,
) -> Result<WatcherState, WatchError> {
    push_and_reload(launcher.as_ref(), reload.as_ref()).await;

    let (coalescer, sender) = WatchCoalescer::new(launcher, reload);
    let _watcher = watch_directory(app_dir, IgnoreRules::load(app_dir), sender)?;
    info!(path = %app_dir.display(), "Watching for changes, press Ctrl+C to stop");

    Ok(coalescer.with_debounce(debounce).run().await)
}
