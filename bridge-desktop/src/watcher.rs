//! Filesystem Watcher Implementation
//!
//! Recursive watcher on top of `notify`. Raw OS events are filtered against
//! the ignored subtrees on the notify thread, forwarded into a tokio channel,
//! and collapsed into one callback per quiet period.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    watcher::{is_ignored, ChangeCallback, FileWatcher},
};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Desktop file watcher backed by the platform's native notification API
/// (inotify, FSEvents, ReadDirectoryChangesW).
pub struct NotifyFileWatcher {
    debounce: Duration,
    /// Dropping the watcher stops event delivery
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl NotifyFileWatcher {
    /// Create a watcher that waits for `debounce` of silence before
    /// reporting a batch of changes.
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            watcher: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle().is_some()
    }

    /// Stop watching. The debounce task exits once pending events drain.
    pub fn stop(&self) {
        if self.handle().take().is_some() {
            debug!("File watcher stopped");
        }
    }

    fn handle(&self) -> MutexGuard<'_, Option<RecommendedWatcher>> {
        self.watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl FileWatcher for NotifyFileWatcher {
    async fn start(
        &self,
        root: &Path,
        ignored: Vec<PathBuf>,
        on_change: ChangeCallback,
    ) -> Result<()> {
        let ignored = with_canonical_forms(ignored);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_relevant(&event, &ignored) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => warn!(error = %e, "File watcher error"),
            },
            NotifyConfig::default(),
        )
        .map_err(|e| BridgeError::Watch(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| BridgeError::Watch(format!("Failed to watch {}: {}", root.display(), e)))?;

        tokio::spawn(debounce_changes(rx, self.debounce, on_change));

        if self.handle().replace(watcher).is_some() {
            debug!("Replaced previous file watcher");
        }

        info!(
            root = %root.display(),
            debounce_ms = self.debounce.as_millis() as u64,
            "Watching directory recursively"
        );
        Ok(())
    }
}

/// Ignored roots plus their canonical forms, since notify reports resolved
/// paths (e.g. `/private/tmp` for `/tmp` on macOS).
fn with_canonical_forms(ignored: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut all = ignored.clone();
    for path in ignored {
        if let Ok(canonical) = path.canonicalize() {
            if canonical != path {
                all.push(canonical);
            }
        }
    }
    all
}

/// Whether a raw event should count as a change.
///
/// Access events never count. Events without paths (overflow, rescan) always
/// count. Otherwise at least one path must lie outside the ignored subtrees.
fn is_relevant(event: &Event, ignored: &[PathBuf]) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }

    event.paths.is_empty() || event.paths.iter().any(|path| !is_ignored(path, ignored))
}

/// Wait for a first event, keep absorbing events until `debounce` passes
/// without one, then spawn the callback for the whole batch.
async fn debounce_changes(
    mut events: mpsc::UnboundedReceiver<()>,
    debounce: Duration,
    on_change: ChangeCallback,
) {
    while events.recv().await.is_some() {
        loop {
            match tokio::time::timeout(debounce, events.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        debug!("Filesystem changes settled");
        tokio::spawn(on_change());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_callback() -> (ChangeCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let callback: ChangeCallback = Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });
        (callback, count)
    }

    fn app_dirs(root: &Path) -> Vec<PathBuf> {
        let app = root.join(".syncany");
        vec![app.clone(), app.join("cache"), app.join("db"), app.join("logs")]
    }

    #[test]
    fn test_event_under_ignored_subtree_is_irrelevant() {
        let ignored = vec![PathBuf::from("/data/.syncany")];
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/data/.syncany/db/local-1.db"));

        assert!(!is_relevant(&event, &ignored));
    }

    #[test]
    fn test_event_with_one_visible_path_is_relevant() {
        let ignored = vec![PathBuf::from("/data/.syncany")];
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/data/.syncany/cache/tmp"))
            .add_path(PathBuf::from("/data/report.odt"));

        assert!(is_relevant(&event, &ignored));
    }

    #[test]
    fn test_access_and_pathless_events() {
        let access = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/data/report.odt"));
        assert!(!is_relevant(&access, &[]));

        let rescan = Event::new(EventKind::Create(CreateKind::Any));
        assert!(is_relevant(&rescan, &[PathBuf::from("/data/.syncany")]));
    }

    #[tokio::test]
    async fn test_start_fails_for_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = NotifyFileWatcher::new(Duration::from_millis(50));
        let (callback, _) = counting_callback();

        let result = watcher
            .start(&dir.path().join("missing"), Vec::new(), callback)
            .await;

        assert!(matches!(result, Err(BridgeError::Watch(_))));
        assert!(!watcher.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_change_outside_ignored_dirs_fires_once_per_burst() {
        let dir = tempfile::tempdir().unwrap();
        let ignored = app_dirs(dir.path());
        for path in &ignored {
            std::fs::create_dir_all(path).unwrap();
        }

        let watcher = NotifyFileWatcher::new(Duration::from_millis(200));
        let (callback, count) = counting_callback();
        watcher.start(dir.path(), ignored, callback).await.unwrap();
        assert!(watcher.is_running());

        for i in 0..5 {
            std::fs::write(dir.path().join(format!("file-{i}.txt")), b"hello").unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while count.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("watcher never reported the change");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_change_inside_ignored_dirs_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let ignored = app_dirs(dir.path());
        for path in &ignored {
            std::fs::create_dir_all(path).unwrap();
        }

        let watcher = NotifyFileWatcher::new(Duration::from_millis(100));
        let (callback, count) = counting_callback();
        watcher
            .start(dir.path(), ignored.clone(), callback)
            .await
            .unwrap();

        std::fs::write(ignored[2].join("local-1.db"), b"db").unwrap();
        std::fs::write(ignored[3].join("daemon.log"), b"log line").unwrap();
        std::fs::write(ignored[1].join("chunk-0001"), b"chunk").unwrap();

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
