//! # Desktop Bridge Implementations
//!
//! Default implementations of the trigger-source bridge traits for desktop
//! platforms (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `FileWatcher` using `notify` (inotify, FSEvents, ReadDirectoryChangesW)
//!   with a quiet-period debounce
//! - `NotificationChannel` using a TCP client for the fanout line protocol,
//!   with automatic reconnect and resubscribe
//!
//! `SyncPipeline` has no desktop default; the embedding application supplies
//! its own pull and push operations.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FanoutChannel, NotifyFileWatcher};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let watcher = NotifyFileWatcher::new(Duration::from_secs(3));
//!     let channel = FanoutChannel::connect("notify.syncany.org:8080");
//!
//!     // Hand both to the SyncCoordinator builder
//! }
//! ```

mod fanout;
mod watcher;

pub use fanout::{FanoutChannel, DEFAULT_RECONNECT_DELAY};
pub use watcher::NotifyFileWatcher;
