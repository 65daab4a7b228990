//! # Syncwatch
//!
//! Continuous sync coordinator for a locally checked-out repository.
//!
//! This facade re-exports the workspace crates so host applications depend on
//! one package:
//! - [`bridge_traits`]: pipeline, watcher and notification contracts
//! - [`core_runtime`]: configuration, identity, logging and the event bus
//! - [`core_sync`]: the coordinator and its single-flight pass execution
//!
//! With the `desktop-shims` feature (default), [`bridge_desktop`] adapters are
//! re-exported as well and [`desktop_coordinator`] wires them from a
//! [`WatchConfig`].

pub use bridge_traits;
pub use core_runtime;
pub use core_sync;

pub use bridge_traits::{
    BridgeError, ChangeCallback, ChangeSet, FileWatcher, MessageCallback, NotificationChannel,
    PullResult, PullResultCode, PushResult, PushResultCode, SyncPipeline,
};
pub use core_runtime::events::{CoreEvent, EventBus, SyncEvent, WatchEvent};
pub use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
pub use core_runtime::{AnnouncementConfig, RepositoryIdentity, WatchConfig, WatchConfigBuilder};
pub use core_sync::{
    PassReport, PassStatus, RequestOutcome, SyncCoordinator, SyncCoordinatorBuilder, SyncError,
    SyncState, TriggerEvent, TriggerPolicy,
};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{FanoutChannel, NotifyFileWatcher};

/// Build a coordinator backed by the desktop adapters.
///
/// The watcher uses `config.watch_debounce`. A [`FanoutChannel`] is connected
/// only when announcements are enabled.
///
/// # Errors
///
/// Returns `SyncError::Config` if announcements are enabled and no tokio
/// runtime is running, plus any error from the coordinator builder.
#[cfg(feature = "desktop-shims")]
pub fn desktop_coordinator<D>(
    config: WatchConfig,
    database: std::sync::Arc<D>,
    pipeline: std::sync::Arc<dyn SyncPipeline<D>>,
) -> core_sync::Result<SyncCoordinator<D>>
where
    D: Send + Sync + 'static,
{
    use std::sync::Arc;

    if config.announcements_enabled() && tokio::runtime::Handle::try_current().is_err() {
        return Err(SyncError::Config(
            "Announcements need a running tokio runtime for the fanout connection".to_string(),
        ));
    }

    let watcher = Arc::new(NotifyFileWatcher::new(config.watch_debounce));
    let channel = config
        .announcements
        .as_ref()
        .map(|endpoint| Arc::new(FanoutChannel::connect(endpoint.address())));

    let mut builder = SyncCoordinator::builder(config, database, pipeline).file_watcher(watcher);
    if let Some(channel) = channel {
        builder = builder.notification_channel(channel);
    }
    builder.build()
}
