//! # Change Announcer
//!
//! Tells other replicas of the repository that this one uploaded changes so
//! they can sync without waiting for their own timer. The message is only a
//! marker; receivers still pull to learn what changed.

use crate::SyncError;
use bridge_traits::notification::NotificationChannel;
use core_runtime::identity::RepositoryIdentity;
use std::sync::Arc;
use tracing::{debug, warn};

/// Payload published after a pass with changes
pub const CHANGE_MARKER: &str = "1";

/// Best-effort publisher of change markers
pub struct ChangeAnnouncer {
    channel: Arc<dyn NotificationChannel>,
}

impl ChangeAnnouncer {
    pub fn new(channel: Arc<dyn NotificationChannel>) -> Self {
        Self { channel }
    }

    /// Publish [`CHANGE_MARKER`] on `hex(identity)`.
    ///
    /// Failures are logged and swallowed. Returns whether the channel
    /// accepted the message.
    pub async fn announce(&self, identity: &RepositoryIdentity) -> bool {
        let channel_key = identity.to_hex();

        match self.channel.announce(&channel_key, CHANGE_MARKER).await {
            Ok(()) => {
                debug!(channel = %channel_key, "Announced local changes");
                true
            }
            Err(e) => {
                let err = SyncError::Announce(e);
                warn!(channel = %channel_key, error = %err, "Could not announce local changes");
                false
            }
        }
    }
}
