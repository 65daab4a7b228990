//! Filesystem Watch Abstraction
//!
//! Delivers a callback when something changes under a watched root.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;

/// Callback invoked after a (debounced) batch of filesystem changes.
///
/// The returned future is driven to completion by the watcher on its own task,
/// so a slow callback never stalls event collection.
pub type ChangeCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Recursive filesystem watcher trait
///
/// Implementations must:
/// - Watch `root` recursively
/// - Never invoke `on_change` for events that only touch paths under one of
///   `ignored` (the application's own metadata, cache, database and log
///   directories live inside the watched root)
/// - Coalesce bursts of events before invoking `on_change`
///
/// # Example
///
/// ```ignore
/// use bridge_traits::watcher::{ChangeCallback, FileWatcher};
/// use futures_util::FutureExt;
/// use std::sync::Arc;
///
/// async fn watch(watcher: &dyn FileWatcher) -> Result<()> {
///     let on_change: ChangeCallback = Arc::new(|| async { println!("changed") }.boxed());
///     watcher.start(Path::new("/data"), vec!["/data/.syncany".into()], on_change).await
/// }
/// ```
#[async_trait]
pub trait FileWatcher: Send + Sync {
    /// Start watching. Fails if the OS watch cannot be established.
    async fn start(&self, root: &Path, ignored: Vec<PathBuf>, on_change: ChangeCallback)
        -> Result<()>;
}

/// Returns true when `path` lies inside (or is) one of the `ignored` subtrees.
pub fn is_ignored(path: &Path, ignored: &[PathBuf]) -> bool {
    ignored.iter().any(|prefix| path.starts_with(prefix))
}
