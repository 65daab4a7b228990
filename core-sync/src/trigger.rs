//! Trigger events and request outcomes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a pass was requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// Periodic timer tick
    Timer,
    /// Debounced filesystem change under the watched root
    FileSystemChange,
    /// Message on the repository's notification channel
    RemoteNotification { channel: String, payload: String },
}

impl TriggerEvent {
    /// Short label used in logs and events
    pub fn label(&self) -> &'static str {
        match self {
            TriggerEvent::Timer => "timer",
            TriggerEvent::FileSystemChange => "filesystem",
            TriggerEvent::RemoteNotification { .. } => "notification",
        }
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classification of a finished pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    NoChanges,
    Changes,
    Failed,
}

/// What the caller of `request_sync` ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Passes run by this call; more than one only under `TriggerPolicy::Coalesce`
    pub passes: u32,
    /// Status of the final pass
    pub last: PassStatus,
    /// Rendered error of the final pass when it failed
    pub error: Option<String>,
}

impl PassReport {
    pub fn failed(&self) -> bool {
        self.last == PassStatus::Failed
    }
}

/// Result of `SyncCoordinator::request_sync`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The caller ran one or more passes
    Executed(PassReport),
    /// A pass was running; the trigger was discarded
    Dropped,
    /// A pass was running; the trigger was folded into a follow-up pass
    Deferred,
}

impl RequestOutcome {
    pub fn was_executed(&self) -> bool {
        matches!(self, RequestOutcome::Executed(_))
    }

    pub fn report(&self) -> Option<&PassReport> {
        match self {
            RequestOutcome::Executed(report) => Some(report),
            _ => None,
        }
    }
}
