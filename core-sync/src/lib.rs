//! # Continuous Sync Module
//!
//! Keeps a local repository in sync by running pull-then-push passes on a
//! timer, on filesystem changes and on remote change notifications.
//!
//! ## Overview
//!
//! Three trigger sources call into one coordinator that runs at most one
//! pass at a time. Triggers arriving mid-pass are dropped (or, under
//! [`TriggerPolicy::Coalesce`], folded into one follow-up pass). Failed
//! passes are logged and retried at the next trigger; the loop never exits
//! on its own.
//!
//! ## Components
//!
//! - **Sync State Machine** (`state`): Idle/Running with a single-flight gate
//! - **Triggers** (`trigger`): Trigger events and request outcomes
//! - **Sync Runner** (`runner`): One pull-then-push pass and its classification
//! - **Change Announcer** (`announcer`): Change markers for other replicas
//! - **Sync Coordinator** (`coordinator`): Timer loop, listeners and dispatch

pub mod announcer;
pub mod coordinator;
pub mod error;
pub mod runner;
pub mod state;
pub mod trigger;

pub use announcer::{ChangeAnnouncer, CHANGE_MARKER};
pub use coordinator::{SyncCoordinator, SyncCoordinatorBuilder};
pub use core_runtime::config::TriggerPolicy;
pub use error::{Result, SyncError};
pub use runner::{SyncOutcome, SyncRunner};
pub use state::{Admission, FlightGate, FlightGuard, SyncState};
pub use trigger::{PassReport, PassStatus, RequestOutcome, TriggerEvent};
