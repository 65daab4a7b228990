//! # Watch Configuration Module
//!
//! Settings that drive a continuous synchronization coordinator.
//!
//! ## Overview
//!
//! The configuration uses a builder pattern to construct a `WatchConfig`
//! instance. `build()` fills in the repository layout defaults and validates
//! everything up front, so a coordinator never starts with settings it cannot
//! honor.
//!
//! ## Repository Layout
//!
//! Unless overridden, the application directories live inside the watched
//! root and are therefore excluded from filesystem watching:
//!
//! ```text
//! <local_dir>/
//! └── .syncany/        app_dir
//!     ├── cache/       cache_dir
//!     ├── db/          database_dir
//!     └── logs/        log_dir
//! ```
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::{TriggerPolicy, WatchConfig};
//! use std::time::Duration;
//!
//! let config = WatchConfig::builder()
//!     .local_dir("/home/alice/Sync")
//!     .repository_id_hex("ab01ff")
//!     .interval(Duration::from_secs(60))
//!     .announcements("notify.example.com", 8080)
//!     .trigger_policy(TriggerPolicy::Coalesce)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.channel_key(), "ab01ff");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::WatchConfig;
//!
//! // Missing repository id
//! let config = WatchConfig::builder()
//!     .local_dir("/home/alice/Sync")
//!     .build()
//!     .expect("Should fail - missing repository id");
//! ```

use crate::error::{Error, Result};
use crate::identity::RepositoryIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default pause between timer-triggered passes
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(30_000);

/// Default quiet period the filesystem watcher waits before reporting a burst
pub const DEFAULT_WATCH_DEBOUNCE: Duration = Duration::from_millis(3_000);

/// Name of the application directory created inside the synchronized root
pub const APP_DIR_NAME: &str = ".syncany";

/// What to do with a trigger that arrives while a pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerPolicy {
    /// Discard it. The next timer tick picks up whatever it announced.
    #[default]
    Drop,
    /// Remember that something arrived and run one more pass afterwards.
    Coalesce,
}

impl TriggerPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerPolicy::Drop => "drop",
            TriggerPolicy::Coalesce => "coalesce",
        }
    }
}

impl FromStr for TriggerPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "drop" => Ok(TriggerPolicy::Drop),
            "coalesce" => Ok(TriggerPolicy::Coalesce),
            _ => Err(Error::Config(format!("Unknown trigger policy: {}", s))),
        }
    }
}

impl fmt::Display for TriggerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where change announcements are published and received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementConfig {
    pub host: String,
    pub port: u16,
}

impl AnnouncementConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config(
                "Announcements host cannot be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(Error::Config(
                "Announcements port must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// `host:port`, suitable for `TcpStream::connect`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration for a sync coordinator.
///
/// Use [`WatchConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Root of the synchronized tree
    pub local_dir: PathBuf,

    /// Application metadata directory
    pub app_dir: PathBuf,

    /// Chunk/cache directory
    pub cache_dir: PathBuf,

    /// Local database directory
    pub database_dir: PathBuf,

    /// Log directory
    pub log_dir: PathBuf,

    /// Identity of the synchronized repository
    pub repository_id: RepositoryIdentity,

    /// Fixed pause after every timer-triggered pass, successful or not
    pub interval: Duration,

    /// Remote announcements; `None` disables subscribing and announcing
    pub announcements: Option<AnnouncementConfig>,

    /// Handling of triggers that arrive mid-pass
    pub trigger_policy: TriggerPolicy,

    /// Quiet period handed to the filesystem watcher
    pub watch_debounce: Duration,
}

impl WatchConfig {
    /// Creates a new builder for constructing a `WatchConfig`.
    pub fn builder() -> WatchConfigBuilder {
        WatchConfigBuilder::default()
    }

    /// Whether the notification subscription and announcer are active
    pub fn announcements_enabled(&self) -> bool {
        self.announcements.is_some()
    }

    /// Subtrees the filesystem watcher must never report: app, cache,
    /// database and log directories, in that order.
    pub fn ignored_paths(&self) -> Vec<PathBuf> {
        vec![
            self.app_dir.clone(),
            self.cache_dir.clone(),
            self.database_dir.clone(),
            self.log_dir.clone(),
        ]
    }

    /// Notification channel key for this repository
    pub fn channel_key(&self) -> String {
        self.repository_id.to_hex()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Local directory is not empty
    /// - Interval is non-zero
    /// - Announcement endpoint is complete when enabled
    pub fn validate(&self) -> Result<()> {
        if self.local_dir.as_os_str().is_empty() {
            return Err(Error::Config("Local directory cannot be empty".to_string()));
        }

        if self.interval.is_zero() {
            return Err(Error::Config(
                "Sync interval must be greater than 0ms".to_string(),
            ));
        }

        if let Some(announcements) = &self.announcements {
            announcements.validate()?;
        }

        Ok(())
    }
}

/// Builder for constructing [`WatchConfig`] instances.
#[derive(Debug, Default)]
pub struct WatchConfigBuilder {
    local_dir: Option<PathBuf>,
    app_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    database_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    repository_id: Option<Result<RepositoryIdentity>>,
    interval: Option<Duration>,
    announcements: Option<AnnouncementConfig>,
    trigger_policy: TriggerPolicy,
    watch_debounce: Option<Duration>,
}

impl WatchConfigBuilder {
    /// Sets the synchronized root directory (required).
    pub fn local_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.local_dir = Some(path.into());
        self
    }

    /// Overrides the application directory.
    ///
    /// Default: `<local_dir>/.syncany`
    pub fn app_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.app_dir = Some(path.into());
        self
    }

    /// Default: `<app_dir>/cache`
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Default: `<app_dir>/db`
    pub fn database_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_dir = Some(path.into());
        self
    }

    /// Default: `<app_dir>/logs`
    pub fn log_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.log_dir = Some(path.into());
        self
    }

    /// Sets the repository identity (required).
    pub fn repository_id(mut self, id: RepositoryIdentity) -> Self {
        self.repository_id = Some(Ok(id));
        self
    }

    /// Sets the repository identity from raw bytes. Invalid input surfaces
    /// from [`build()`](WatchConfigBuilder::build).
    pub fn repository_id_bytes(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.repository_id = Some(RepositoryIdentity::from_bytes(bytes));
        self
    }

    /// Sets the repository identity from its hex form.
    pub fn repository_id_hex(mut self, hex_str: &str) -> Self {
        self.repository_id = Some(RepositoryIdentity::from_hex(hex_str));
        self
    }

    /// Sets the pause between timer-triggered passes.
    ///
    /// Default: 30 seconds
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Sets the pause between timer-triggered passes in milliseconds.
    pub fn interval_ms(self, millis: u64) -> Self {
        self.interval(Duration::from_millis(millis))
    }

    /// Enables remote announcements through the given endpoint.
    pub fn announcements(mut self, host: impl Into<String>, port: u16) -> Self {
        self.announcements = Some(AnnouncementConfig::new(host, port));
        self
    }

    /// Enables or disables announcements from an optional endpoint.
    pub fn announcement_config(mut self, config: Option<AnnouncementConfig>) -> Self {
        self.announcements = config;
        self
    }

    /// Default: [`TriggerPolicy::Drop`]
    pub fn trigger_policy(mut self, policy: TriggerPolicy) -> Self {
        self.trigger_policy = policy;
        self
    }

    /// Default: 3 seconds
    pub fn watch_debounce(mut self, debounce: Duration) -> Self {
        self.watch_debounce = Some(debounce);
        self
    }

    /// Builds the final `WatchConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `local_dir` or the repository id is missing
    /// - The repository id is empty or not valid hex
    /// - Any value fails [`WatchConfig::validate`]
    pub fn build(self) -> Result<WatchConfig> {
        let local_dir = self.local_dir.ok_or_else(|| {
            Error::Config("Local directory is required. Use .local_dir() to set it.".to_string())
        })?;

        let repository_id = self.repository_id.ok_or_else(|| {
            Error::Config(
                "Repository id is required. Use .repository_id() to set it.".to_string(),
            )
        })??;

        let app_dir = self.app_dir.unwrap_or_else(|| local_dir.join(APP_DIR_NAME));
        let cache_dir = self.cache_dir.unwrap_or_else(|| app_dir.join("cache"));
        let database_dir = self.database_dir.unwrap_or_else(|| app_dir.join("db"));
        let log_dir = self.log_dir.unwrap_or_else(|| app_dir.join("logs"));

        let config = WatchConfig {
            local_dir,
            app_dir,
            cache_dir,
            database_dir,
            log_dir,
            repository_id,
            interval: self.interval.unwrap_or(DEFAULT_INTERVAL),
            announcements: self.announcements,
            trigger_policy: self.trigger_policy,
            watch_debounce: self.watch_debounce.unwrap_or(DEFAULT_WATCH_DEBOUNCE),
        };

        config.validate()?;

        Ok(config)
    }
}
