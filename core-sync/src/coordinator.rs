//! # Sync Coordinator
//!
//! Funnels three independent trigger sources into one serialized pass at a
//! time.
//!
//! ## Overview
//!
//! - A periodic timer requests a pass, then sleeps the configured interval
//!   whether the pass succeeded or not (no backoff, no jitter)
//! - The filesystem watcher requests a pass after each debounced batch of
//!   changes outside the application's own directories
//! - The notification channel requests a pass when another replica
//!   announces a change on `hex(repository_id)`
//!
//! All three call [`SyncCoordinator::request_sync`]. If a pass is already
//! running the trigger is dropped (or deferred into a single follow-up pass
//! under [`TriggerPolicy::Coalesce`]). Pass failures are logged and reported
//! through the event bus; they never escape to the trigger source.
//!
//! ## Workflow
//!
//! 1. Subscribe to the repository's notification channel (if announcements are enabled)
//! 2. Start the filesystem watcher (best-effort)
//! 3. Loop: request a timer pass, log the result, sleep the interval
//!
//! A pass pulls remote changes, pushes local ones, and announces on the
//! channel when the push uploaded something.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncCoordinator;
//! use std::sync::Arc;
//!
//! let coordinator = SyncCoordinator::builder(config, Arc::new(database), pipeline)
//!     .file_watcher(watcher)
//!     .notification_channel(channel)
//!     .build()?;
//!
//! // Runs until the process is killed
//! coordinator.start().await;
//! ```

use crate::announcer::ChangeAnnouncer;
use crate::runner::{SyncOutcome, SyncRunner};
use crate::state::{Admission, FlightGate, SyncState};
use crate::trigger::{PassReport, PassStatus, RequestOutcome, TriggerEvent};
use crate::{Result, SyncError};
use bridge_traits::notification::{MessageCallback, NotificationChannel};
use bridge_traits::pipeline::SyncPipeline;
use bridge_traits::watcher::{ChangeCallback, FileWatcher};
use core_runtime::config::{TriggerPolicy, WatchConfig};
use core_runtime::events::{CoreEvent, EventBus, Receiver, SyncEvent, WatchEvent};
use futures_util::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Continuous sync coordinator
///
/// Cheap to clone; clones share the same state, so the copies handed to
/// trigger callbacks all contend for the same single-flight gate.
pub struct SyncCoordinator<D> {
    inner: Arc<CoordinatorInner<D>>,
}

struct CoordinatorInner<D> {
    config: WatchConfig,
    database: Arc<D>,
    runner: SyncRunner<D>,
    announcer: Option<ChangeAnnouncer>,
    watcher: Option<Arc<dyn FileWatcher>>,
    /// Only set when announcements are enabled
    channel: Option<Arc<dyn NotificationChannel>>,
    gate: FlightGate,
    event_bus: EventBus,
    pass_counter: AtomicU64,
}

impl<D> Clone for SyncCoordinator<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`SyncCoordinator`]
pub struct SyncCoordinatorBuilder<D> {
    config: WatchConfig,
    database: Arc<D>,
    pipeline: Arc<dyn SyncPipeline<D>>,
    watcher: Option<Arc<dyn FileWatcher>>,
    channel: Option<Arc<dyn NotificationChannel>>,
    event_bus: Option<EventBus>,
}

impl<D> SyncCoordinatorBuilder<D>
where
    D: Send + Sync + 'static,
{
    /// Filesystem watcher started by `start()`. Without one, only the timer
    /// and notifications trigger passes.
    pub fn file_watcher(mut self, watcher: Arc<dyn FileWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Channel used to subscribe and announce. Required when the config
    /// enables announcements, ignored otherwise.
    pub fn notification_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Share an existing event bus instead of creating one.
    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// # Errors
    ///
    /// Returns `SyncError::Config` if the config is invalid or announcements
    /// are enabled without a notification channel.
    pub fn build(self) -> Result<SyncCoordinator<D>> {
        self.config.validate()?;

        let channel = match (&self.config.announcements, self.channel) {
            (Some(_), Some(channel)) => Some(channel),
            (Some(endpoint), None) => {
                return Err(SyncError::Config(format!(
                    "Announcements via {} are enabled but no notification channel was provided. Use .notification_channel() to set it.",
                    endpoint.address()
                )));
            }
            (None, Some(_)) => {
                debug!("Announcements disabled, ignoring notification channel");
                None
            }
            (None, None) => None,
        };

        let announcer = channel.clone().map(ChangeAnnouncer::new);

        Ok(SyncCoordinator {
            inner: Arc::new(CoordinatorInner {
                config: self.config,
                database: self.database,
                runner: SyncRunner::new(self.pipeline),
                announcer,
                watcher: self.watcher,
                channel,
                gate: FlightGate::new(),
                event_bus: self.event_bus.unwrap_or_default(),
                pass_counter: AtomicU64::new(0),
            }),
        })
    }
}

impl<D> SyncCoordinator<D>
where
    D: Send + Sync + 'static,
{
    pub fn builder(
        config: WatchConfig,
        database: Arc<D>,
        pipeline: Arc<dyn SyncPipeline<D>>,
    ) -> SyncCoordinatorBuilder<D> {
        SyncCoordinatorBuilder {
            config,
            database,
            pipeline,
            watcher: None,
            channel: None,
            event_bus: None,
        }
    }

    /// Coordinator with no watcher and no notification channel.
    pub fn new(
        config: WatchConfig,
        database: Arc<D>,
        pipeline: Arc<dyn SyncPipeline<D>>,
    ) -> Result<Self> {
        Self::builder(config, database, pipeline).build()
    }

    pub fn config(&self) -> &WatchConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SyncState {
        self.inner.gate.state()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.inner.event_bus.subscribe()
    }

    /// Start the trigger sources and run the timer loop forever.
    pub async fn start(&self) {
        self.run_until(CancellationToken::new()).await;
    }

    /// Same as [`start`](Self::start), returning once `shutdown` is
    /// cancelled. A running pass always finishes first. Call once per
    /// coordinator; every call subscribes and starts the watcher again.
    pub async fn run_until(&self, shutdown: CancellationToken) {
        self.start_listeners().await;

        let interval = self.inner.config.interval;
        info!(
            interval_ms = interval.as_millis() as u64,
            policy = %self.inner.config.trigger_policy,
            "Watch loop started"
        );

        while !shutdown.is_cancelled() {
            match self.request_sync(TriggerEvent::Timer).await {
                RequestOutcome::Executed(report) if report.failed() => {
                    warn!(
                        error = report.error.as_deref().unwrap_or_default(),
                        "Sync FAILED, waiting {} seconds ...",
                        interval.as_secs()
                    );
                }
                _ => info!("Sync done, waiting {} seconds ...", interval.as_secs()),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Watch loop stopped");
    }

    /// Run a pass unless one is already running.
    ///
    /// Safe to call concurrently from any task. The winner runs the pass to
    /// completion before returning; everyone else returns immediately with
    /// [`RequestOutcome::Dropped`] or [`RequestOutcome::Deferred`] depending
    /// on the trigger policy. Pass failures are folded into the report.
    #[instrument(skip_all, fields(trigger = %trigger))]
    pub async fn request_sync(&self, trigger: TriggerEvent) -> RequestOutcome {
        let policy = self.inner.config.trigger_policy;

        let mut guard = match self.inner.gate.try_enter(policy) {
            Admission::Entered(guard) => guard,
            Admission::Dropped => {
                debug!("Sync already running, trigger dropped");
                self.emit(CoreEvent::Sync(SyncEvent::Dropped {
                    trigger: trigger.label().to_string(),
                }));
                return RequestOutcome::Dropped;
            }
            Admission::Deferred => {
                debug!("Sync already running, trigger deferred");
                self.emit(CoreEvent::Sync(SyncEvent::Deferred {
                    trigger: trigger.label().to_string(),
                }));
                return RequestOutcome::Deferred;
            }
        };

        let mut passes = 0;
        loop {
            passes += 1;
            let (last, error) = self.execute_pass(&trigger).await;

            if !guard.finish_or_continue() {
                return RequestOutcome::Executed(PassReport {
                    passes,
                    last,
                    error,
                });
            }

            debug!(passes, "Running follow-up pass for deferred triggers");
        }
    }

    async fn execute_pass(&self, trigger: &TriggerEvent) -> (PassStatus, Option<String>) {
        let pass_id = self.inner.pass_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.emit(CoreEvent::Sync(SyncEvent::Started {
            pass_id,
            trigger: trigger.label().to_string(),
        }));
        debug!(pass_id, "Starting sync pass");

        let started = Instant::now();
        let outcome = self.inner.runner.run(self.inner.database.as_ref()).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let status = outcome.status();

        match outcome {
            SyncOutcome::Changes(change_set) => {
                info!(
                    pass_id,
                    changes = change_set.change_count(),
                    duration_ms,
                    "Sync pass uploaded local changes"
                );
                self.emit(CoreEvent::Sync(SyncEvent::Completed {
                    pass_id,
                    changes_applied: true,
                    duration_ms,
                }));

                if let Some(announcer) = &self.inner.announcer {
                    if announcer.announce(&self.inner.config.repository_id).await {
                        self.emit(CoreEvent::Sync(SyncEvent::Announced {
                            channel: self.inner.config.channel_key(),
                        }));
                    }
                }

                (status, None)
            }
            SyncOutcome::NoChanges => {
                debug!(pass_id, duration_ms, "Sync pass found nothing to upload");
                self.emit(CoreEvent::Sync(SyncEvent::Completed {
                    pass_id,
                    changes_applied: false,
                    duration_ms,
                }));
                (status, None)
            }
            SyncOutcome::Failed(err) => {
                debug!(pass_id, duration_ms, error = %err, "Sync pass failed");
                let message = err.to_string();
                self.emit(CoreEvent::Sync(SyncEvent::Failed {
                    pass_id,
                    message: message.clone(),
                }));
                (status, Some(message))
            }
        }
    }

    /// Notification listener first, then the watcher.
    async fn start_listeners(&self) {
        if let Some(channel) = &self.inner.channel {
            let channel_key = self.inner.config.channel_key();
            match channel.subscribe(&channel_key, self.message_callback()).await {
                Ok(()) => {
                    info!(channel = %channel_key, "Subscribed to change notifications");
                    self.emit(CoreEvent::Watch(WatchEvent::Subscribed {
                        channel: channel_key,
                    }));
                }
                Err(e) => {
                    warn!(channel = %channel_key, error = %e, "Cannot subscribe to change notifications");
                }
            }
        }

        let Some(watcher) = &self.inner.watcher else {
            debug!("No file watcher configured");
            return;
        };

        let root = &self.inner.config.local_dir;
        match watcher
            .start(root, self.inner.config.ignored_paths(), self.change_callback())
            .await
        {
            Ok(()) => {
                info!(root = %root.display(), "File watcher started");
                self.emit(CoreEvent::Watch(WatchEvent::WatcherStarted {
                    root: root.display().to_string(),
                }));
            }
            Err(e) => {
                warn!(error = %e, "Cannot initiate file watcher. Relying on regular tree walks.");
                self.emit(CoreEvent::Watch(WatchEvent::WatcherUnavailable {
                    reason: e.to_string(),
                }));
            }
        }
    }

    fn change_callback(&self) -> ChangeCallback {
        let coordinator = self.clone();
        Arc::new(move || {
            let coordinator = coordinator.clone();
            async move {
                coordinator
                    .request_event_sync(TriggerEvent::FileSystemChange)
                    .await;
            }
            .boxed()
        })
    }

    fn message_callback(&self) -> MessageCallback {
        let coordinator = self.clone();
        Arc::new(move |channel: String, payload: String| {
            let coordinator = coordinator.clone();
            async move {
                debug!(%channel, %payload, "Change notification received");
                coordinator.emit(CoreEvent::Watch(WatchEvent::NotificationReceived {
                    channel: channel.clone(),
                }));
                coordinator
                    .request_event_sync(TriggerEvent::RemoteNotification { channel, payload })
                    .await;
            }
            .boxed()
        })
    }

    async fn request_event_sync(&self, trigger: TriggerEvent) {
        if let RequestOutcome::Executed(report) = self.request_sync(trigger).await {
            if report.failed() {
                warn!(
                    error = report.error.as_deref().unwrap_or_default(),
                    "Sync FAILED (event-triggered)."
                );
            }
        }
    }

    fn emit(&self, event: CoreEvent) {
        self.inner.event_bus.emit(event).ok();
    }

    /// Current trigger policy
    pub fn trigger_policy(&self) -> TriggerPolicy {
        self.inner.config.trigger_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::pipeline::{PullResult, PushResult};

    struct Database;

    struct NoopPipeline;

    #[async_trait]
    impl SyncPipeline<Database> for NoopPipeline {
        async fn pull(&self, _database: &Database) -> BridgeResult<PullResult> {
            Ok(PullResult::no_changes())
        }

        async fn push(&self, _database: &Database) -> BridgeResult<PushResult> {
            Ok(PushResult::no_changes())
        }
    }

    fn config() -> core_runtime::config::WatchConfigBuilder {
        WatchConfig::builder()
            .local_dir("/srv/repo")
            .repository_id_hex("ab01")
    }

    #[test]
    fn test_announcements_require_channel() {
        let config = config().announcements("fanout.local", 8080).build().unwrap();

        let result = SyncCoordinator::new(config, Arc::new(Database), Arc::new(NoopPipeline));

        match result {
            Err(SyncError::Config(message)) => {
                assert!(message.contains("fanout.local:8080"));
                assert!(message.contains(".notification_channel()"));
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("build should fail without a channel"),
        }
    }

    #[tokio::test]
    async fn test_single_pass_returns_to_idle() {
        let coordinator =
            SyncCoordinator::new(config().build().unwrap(), Arc::new(Database), Arc::new(NoopPipeline))
                .unwrap();
        let mut events = coordinator.subscribe_events();

        let outcome = coordinator.request_sync(TriggerEvent::Timer).await;

        assert_eq!(
            outcome,
            RequestOutcome::Executed(PassReport {
                passes: 1,
                last: PassStatus::NoChanges,
                error: None,
            })
        );
        assert_eq!(coordinator.state(), SyncState::Idle);

        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Started {
                pass_id: 1,
                trigger: "timer".to_string(),
            })
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Completed {
                pass_id: 1,
                changes_applied: false,
                ..
            })
        ));
    }

    #[test]
    fn test_clones_share_state() {
        let coordinator =
            SyncCoordinator::new(config().build().unwrap(), Arc::new(Database), Arc::new(NoopPipeline))
                .unwrap();
        let clone = coordinator.clone();

        assert!(Arc::ptr_eq(&coordinator.inner, &clone.inner));
        assert_eq!(clone.trigger_policy(), TriggerPolicy::Drop);
    }
}
