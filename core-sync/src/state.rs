//! # Sync State Machine
//!
//! The coordinator's only shared mutable state.
//!
//! ```text
//! Idle ──(trigger accepted)──> Running ──(pass completes)──> Idle
//! ```
//!
//! [`FlightGate`] performs the Idle → Running check-and-set under one lock so
//! that of two simultaneous triggers exactly one wins. The returned
//! [`FlightGuard`] moves the state back to Idle when the pass is done, even if
//! the pass future is dropped part way.

use crate::{Result, SyncError};
use core_runtime::config::TriggerPolicy;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No pass is running
    Idle,
    /// A pass is running
    Running,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Running => "running",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SyncState::Running)
    }

    /// Validate a transition and return the new state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` for Idle → Idle and Running → Running.
    pub fn transition(self, to: SyncState) -> Result<SyncState> {
        match (self, to) {
            (SyncState::Idle, SyncState::Running) | (SyncState::Running, SyncState::Idle) => Ok(to),
            _ => Err(SyncError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            }),
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState::Idle
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Single-flight gate
// ============================================================================

#[derive(Debug, Default)]
struct GateState {
    state: SyncState,
    /// Set by triggers deferred under `TriggerPolicy::Coalesce`
    pending: bool,
}

impl GateState {
    /// Running → Idle, clearing any owed follow-up pass
    fn release(&mut self) -> Result<()> {
        self.state = self.state.transition(SyncState::Idle)?;
        self.pending = false;
        Ok(())
    }
}

/// Result of asking the gate for permission to run a pass
#[derive(Debug)]
pub enum Admission<'a> {
    /// The caller owns the pass
    Entered(FlightGuard<'a>),
    /// A pass was already running; the trigger is forgotten
    Dropped,
    /// A pass was already running; one follow-up pass is owed
    Deferred,
}

/// Single-flight guard around [`SyncState`]
#[derive(Debug, Default)]
pub struct FlightGate {
    inner: Mutex<GateState>,
}

impl FlightGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // A panic while holding the lock cannot leave GateState half-written
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> SyncState {
        self.lock().state
    }

    /// Whether a follow-up pass has been requested
    pub fn has_pending(&self) -> bool {
        self.lock().pending
    }

    /// Atomically move Idle → Running, or record the refused trigger
    /// according to `policy`.
    pub fn try_enter(&self, policy: TriggerPolicy) -> Admission<'_> {
        let mut gate = self.lock();

        match gate.state.transition(SyncState::Running) {
            Ok(next) => {
                gate.state = next;
                gate.pending = false;
                Admission::Entered(FlightGuard {
                    gate: self,
                    released: false,
                })
            }
            Err(_) => match policy {
                TriggerPolicy::Drop => Admission::Dropped,
                TriggerPolicy::Coalesce => {
                    gate.pending = true;
                    Admission::Deferred
                }
            },
        }
    }
}

/// Ownership of the running pass
#[derive(Debug)]
pub struct FlightGuard<'a> {
    gate: &'a FlightGate,
    released: bool,
}

impl FlightGuard<'_> {
    /// Called after each pass. Returns `true` if a deferred trigger asks for
    /// another pass (the state stays Running); otherwise moves to Idle and
    /// returns `false`.
    ///
    /// Checking the pending flag and releasing happen under one lock, so a
    /// trigger is either folded into the next pass or sees Idle.
    pub fn finish_or_continue(&mut self) -> bool {
        if self.released {
            return false;
        }

        let mut gate = self.gate.lock();
        if gate.pending {
            gate.pending = false;
            return true;
        }

        if let Err(e) = gate.release() {
            warn!(error = %e, "Flight guard released an idle gate");
        }
        self.released = true;
        false
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.gate.lock().release() {
                warn!(error = %e, "Flight guard dropped on an idle gate");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert_eq!(
            SyncState::Idle.transition(SyncState::Running).unwrap(),
            SyncState::Running
        );
        assert_eq!(
            SyncState::Running.transition(SyncState::Idle).unwrap(),
            SyncState::Idle
        );
    }

    #[test]
    fn test_running_to_running_rejected() {
        let err = SyncState::Running
            .transition(SyncState::Running)
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidStateTransition { ref from, ref to } if from == "running" && to == "running"
        ));
        assert!(SyncState::Idle.transition(SyncState::Idle).is_err());
    }

    #[test]
    fn test_gate_enters_once() {
        let gate = FlightGate::new();

        let first = gate.try_enter(TriggerPolicy::Drop);
        assert!(matches!(first, Admission::Entered(_)));
        assert_eq!(gate.state(), SyncState::Running);

        assert!(matches!(gate.try_enter(TriggerPolicy::Drop), Admission::Dropped));
        assert!(!gate.has_pending());

        drop(first);
        assert_eq!(gate.state(), SyncState::Idle);
    }

    #[test]
    fn test_finish_releases_gate() {
        let gate = FlightGate::new();
        let Admission::Entered(mut guard) = gate.try_enter(TriggerPolicy::Drop) else {
            panic!("gate should be idle");
        };

        assert!(!guard.finish_or_continue());
        assert_eq!(gate.state(), SyncState::Idle);

        // Released guard must not touch a gate someone else entered
        let second = gate.try_enter(TriggerPolicy::Drop);
        assert!(matches!(second, Admission::Entered(_)));
        drop(guard);
        assert_eq!(gate.state(), SyncState::Running);
    }

    #[test]
    fn test_coalesce_collapses_into_one_follow_up() {
        let gate = FlightGate::new();
        let Admission::Entered(mut guard) = gate.try_enter(TriggerPolicy::Coalesce) else {
            panic!("gate should be idle");
        };

        for _ in 0..3 {
            assert!(matches!(
                gate.try_enter(TriggerPolicy::Coalesce),
                Admission::Deferred
            ));
        }
        assert!(gate.has_pending());

        assert!(guard.finish_or_continue());
        assert_eq!(gate.state(), SyncState::Running);
        assert!(!gate.has_pending());

        assert!(!guard.finish_or_continue());
        assert_eq!(gate.state(), SyncState::Idle);
    }

    #[test]
    fn test_release_is_a_validated_transition() {
        let mut running = GateState {
            state: SyncState::Running,
            pending: true,
        };
        assert!(running.release().is_ok());
        assert_eq!(running.state, SyncState::Idle);
        assert!(!running.pending);

        let mut idle = GateState::default();
        assert!(matches!(
            idle.release(),
            Err(SyncError::InvalidStateTransition { .. })
        ));
        assert_eq!(idle.state, SyncState::Idle);
    }

    #[test]
    fn test_dropped_guard_clears_pending() {
        let gate = FlightGate::new();
        let entered = gate.try_enter(TriggerPolicy::Coalesce);
        assert!(matches!(
            gate.try_enter(TriggerPolicy::Coalesce),
            Admission::Deferred
        ));

        drop(entered);
        assert_eq!(gate.state(), SyncState::Idle);
        assert!(!gate.has_pending());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SyncState::Idle.to_string(), "idle");
        assert_eq!(SyncState::Running.to_string(), "running");
        assert!(SyncState::Running.is_running());
        assert_eq!(SyncState::default(), SyncState::Idle);
    }
}
