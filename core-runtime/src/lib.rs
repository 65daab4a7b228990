//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the sync daemon:
//! - Watch configuration and repository identity
//! - Logging and tracing infrastructure
//! - Event bus system
//!
//! ## Overview
//!
//! Other crates depend on this one for the settings that drive a coordinator,
//! the logging conventions, and the broadcast channel used to observe passes.

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod logging;

pub use config::{AnnouncementConfig, TriggerPolicy, WatchConfig, WatchConfigBuilder};
pub use error::{Error, Result};
pub use identity::RepositoryIdentity;
