//! Signals fired after every push in watch mode.

use async_trait::async_trait;
use tracing::info;

/// Told about every finished push so previews can refresh.
#[async_trait]
pub trait ReloadSignal: Send + Sync {
    /// Called after a push; `uri` is the published location on success.
    async fn reload(&self, uri: Option<&str>);
}

/// Logs where the refreshed app can be viewed.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReloadSignal;

#[async_trait]
impl ReloadSignal for LoggingReloadSignal {
    async fn reload(&self, uri: Option<&str>) {
        match uri {
            Some(uri) => info!(uri = %uri, "App updated, reload to see the changes"),
            None => info!("Push finished without a new version"),
        }
    }
}

/// Ignores reloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReloadSignal;

#[async_trait]
impl ReloadSignal for NoOpReloadSignal {
    async fn reload(&self, _uri: Option<&str>) {}
}

/// Picks the reload signal for the `--no-browser` flag.
#[must_use]
pub fn reload_signal_for(no_browser: bool) -> std::sync::Arc<dyn ReloadSignal> {
    if no_browser {
        std::sync::Arc::new(NoOpReloadSignal)
    } else {
        std::sync::Arc::new(LoggingReloadSignal)
    }
}
