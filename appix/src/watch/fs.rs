//! Bridges file-system notifications into the watch loop.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::state::WatchEvent;
use crate::errors::WatchError;
use crate::packaging::IgnoreRules;

/// Returns true if `event` touches at least one path that is packed.
#[must_use]
pub fn is_relevant(event: &Event, app_dir: &Path, rules: &IgnoreRules) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }

    event.paths.iter().any(|path| {
        let relative = path.strip_prefix(app_dir).unwrap_or(path);
        rules.should_include(relative)
    })
}

/// Watches `app_dir` recursively and sends [`WatchEvent::FileChanged`] for
/// every relevant change.
///
/// The returned watcher must be kept alive for as long as changes should be
/// reported. Changes that arrive while the channel is full are dropped; the
/// loop already has a pending change to act on.
pub fn watch_directory(
    app_dir: &Path,
    rules: IgnoreRules,
    sender: mpsc::Sender<WatchEvent>,
) -> Result<RecommendedWatcher, WatchError> {
    let root: PathBuf = app_dir
        .canonicalize()
        .map_err(|source| WatchError::InvalidPath {
            path: app_dir.to_path_buf(),
            source,
        })?;
    let filter_root = root.clone();

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
        match event {
            Ok(event) if is_relevant(&event, &filter_root, &rules) => {
                trace!(paths = ?event.paths, kind = ?event.kind, "File change");
                if sender.try_send(WatchEvent::FileChanged).is_err() {
                    debug!("Change dropped, loop is busy or stopped");
                }
            }
            Ok(event) => trace!(paths = ?event.paths, "Ignored change"),
            Err(error) => warn!(error = %error, "Watch backend error"),
        }
    })?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    debug!(path = %root.display(), "Watching directory");
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::time::Duration;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn test_ignored_paths_are_not_relevant() {
        let rules = IgnoreRules::builtin();
        let app = Path::new("/work/app");

        assert!(!is_relevant(
            &event(EventKind::Create(CreateKind::File), &["/work/app/node_modules/x.js"]),
            app,
            &rules
        ));
        assert!(!is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), &["/work/app/.git/index"]),
            app,
            &rules
        ));
    }

    #[test]
    fn test_mixed_paths_are_relevant() {
        let rules = IgnoreRules::builtin();
        let app = Path::new("/work/app");

        assert!(is_relevant(
            &event(
                EventKind::Modify(ModifyKind::Any),
                &["/work/app/.git/index", "/work/app/src/main.js"]
            ),
            app,
            &rules
        ));
    }

    #[test]
    fn test_access_events_are_not_relevant() {
        let rules = IgnoreRules::builtin();
        assert!(!is_relevant(
            &event(EventKind::Access(AccessKind::Any), &["/work/app/src/main.js"]),
            Path::new("/work/app"),
            &rules
        ));
    }

    #[test]
    fn test_missing_directory_is_rejected() {
        let (sender, _receiver) = mpsc::channel(1);
        let result = watch_directory(
            Path::new("/definitely/not/here"),
            IgnoreRules::builtin(),
            sender,
        );
        assert!(matches!(result, Err(WatchError::InvalidPath { .. })));
    }

    #[tokio::test]
    async fn test_file_write_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (sender, mut receiver) = mpsc::channel(16);
        let _watcher = watch_directory(dir.path(), IgnoreRules::builtin(), sender).unwrap();

        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(WatchEvent::FileChanged));
    }
}
