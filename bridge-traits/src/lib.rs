//! # Host Bridge Traits
//!
//! Contracts between the sync core and the collaborators it drives but does
//! not implement.
//!
//! ## Traits
//!
//! ### Synchronization
//! - [`SyncPipeline`](pipeline::SyncPipeline) - Pull-then-push pass over the local database
//!
//! ### Trigger Sources
//! - [`FileWatcher`](watcher::FileWatcher) - Debounced recursive filesystem watcher
//! - [`NotificationChannel`](notification::NotificationChannel) - Pub/sub change announcements
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to the host
//!
//! ## Implementations
//!
//! | Trait | Desktop (`bridge-desktop`) |
//! |-------|----------------------------|
//! | `FileWatcher` | `NotifyFileWatcher` |
//! | `NotificationChannel` | `FanoutChannel` |
//! | `SyncPipeline` | provided by the embedding application |
//!
//! ## Error Handling
//!
//! All traits return [`BridgeError`](error::BridgeError). The coordinator
//! treats any error from a pipeline phase as a failed pass and keeps running.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`; callbacks handed to trigger sources are
//! invoked from the sources' own tasks.

pub mod error;
pub mod logging;
pub mod notification;
pub mod pipeline;
pub mod watcher;

pub use error::BridgeError;

pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use notification::{MessageCallback, NotificationChannel};
pub use pipeline::{
    ChangeSet, PullResult, PullResultCode, PushResult, PushResultCode, SyncPipeline,
};
pub use watcher::{is_ignored, ChangeCallback, FileWatcher};
