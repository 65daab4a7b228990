//! Push Notification Channel Abstraction
//!
//! Publish/subscribe contract used to tell other replicas of a repository
//! that something changed. Messages are tiny markers; receivers still have to
//! pull to find out what changed.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;

use crate::error::Result;

/// Callback invoked with `(channel, message)` for every inbound message on a
/// subscribed channel.
pub type MessageCallback = Arc<dyn Fn(String, String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Notification channel trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::notification::NotificationChannel;
///
/// async fn tell_others(channel: &dyn NotificationChannel, repo_hex: &str) {
///     channel.announce(repo_hex, "1").await.ok();
/// }
/// ```
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Register `on_message` for `channel`. Subscriptions live as long as the
    /// channel object.
    async fn subscribe(&self, channel: &str, on_message: MessageCallback) -> Result<()>;

    /// Publish `message` to everyone subscribed to `channel`.
    async fn announce(&self, channel: &str, message: &str) -> Result<()>;
}
