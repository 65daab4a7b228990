use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Pull phase failed: {0}")]
    Pull(#[source] BridgeError),

    #[error("Push phase failed: {0}")]
    Push(#[source] BridgeError),

    #[error("Announcement failed: {0}")]
    Announce(#[source] BridgeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl From<core_runtime::Error> for SyncError {
    fn from(err: core_runtime::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
