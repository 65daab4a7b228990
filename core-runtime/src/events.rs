//! # Event Bus System
//!
//! Typed event broadcasting for the watch daemon using `tokio::sync::broadcast`.
//! The coordinator publishes what it does with every trigger; hosts subscribe
//! to drive status displays or tests without parsing logs.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wrapping [`SyncEvent`] and [`WatchEvent`]
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Receiver wrapper with predicate filtering
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Dropped {
//!         trigger: "filesystem".to_string(),
//!     }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Trigger dropped while a pass was running");
//! # }
//! ```
//!
//! ## Event Types
//!
//! ### Sync Events
//! - `Started`: A trigger was accepted and a pass began
//! - `Completed`: A pass finished (with or without applied changes)
//! - `Failed`: A pull or push phase failed
//! - `Dropped`: A trigger arrived mid-pass and was discarded
//! - `Deferred`: A trigger arrived mid-pass and was folded into one follow-up pass
//! - `Announced`: A change marker was published for other replicas
//!
//! ### Watch Events
//! - `WatcherStarted`: Filesystem watcher is running under a root
//! - `WatcherUnavailable`: Watcher failed to start; only timer and notifications remain
//! - `Subscribed`: Notification subscription is active
//! - `NotificationReceived`: A remote replica announced a change
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber fell behind and missed `n` events.
//! - **`RecvError::Closed`**: All senders have been dropped.
//!
//! Emitting with no subscribers returns an error that publishers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync pass scheduling and outcomes
    Sync(SyncEvent),
    /// Trigger source lifecycle
    Watch(WatchEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Watch(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Watch(WatchEvent::WatcherUnavailable { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. })
            | CoreEvent::Sync(SyncEvent::Announced { .. })
            | CoreEvent::Watch(WatchEvent::WatcherStarted { .. })
            | CoreEvent::Watch(WatchEvent::Subscribed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events describing how triggers were handled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A trigger was accepted and a pass started.
    Started {
        /// Monotonic pass counter, starting at 1.
        pass_id: u64,
        /// Trigger label ("timer", "filesystem", "notification").
        trigger: String,
    },
    /// A pass finished without error.
    Completed {
        pass_id: u64,
        /// Whether the push phase applied local changes.
        changes_applied: bool,
        duration_ms: u64,
    },
    /// A pass failed in its pull or push phase.
    Failed {
        pass_id: u64,
        /// Rendered error, naming the failing phase.
        message: String,
    },
    /// A trigger was discarded because a pass was running.
    Dropped { trigger: String },
    /// A trigger was folded into a single follow-up pass.
    Deferred { trigger: String },
    /// A change marker was published.
    Announced { channel: String },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync pass started",
            SyncEvent::Completed { .. } => "Sync pass completed",
            SyncEvent::Failed { .. } => "Sync pass failed",
            SyncEvent::Dropped { .. } => "Trigger dropped while a pass was running",
            SyncEvent::Deferred { .. } => "Trigger deferred until the running pass finishes",
            SyncEvent::Announced { .. } => "Change announced to other replicas",
        }
    }
}

// ============================================================================
// Watch Events
// ============================================================================

/// Events describing the trigger sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum WatchEvent {
    /// Filesystem watcher started.
    WatcherStarted {
        /// Watched root directory.
        root: String,
    },
    /// Filesystem watcher could not start.
    WatcherUnavailable { reason: String },
    /// Subscribed to the repository's notification channel.
    Subscribed { channel: String },
    /// A message arrived on the notification channel.
    NotificationReceived { channel: String },
}

impl WatchEvent {
    fn description(&self) -> &str {
        match self {
            WatchEvent::WatcherStarted { .. } => "File watcher started",
            WatchEvent::WatcherUnavailable { .. } => "File watcher unavailable",
            WatchEvent::Subscribed { .. } => "Subscribed to notification channel",
            WatchEvent::NotificationReceived { .. } => "Remote change notification received",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus yields another producer on the same channel. Each
/// `subscribe()` creates an independent receiver that sees future events only.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let sync_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
