//! Transport layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    /// Another command is still in flight; this one was dropped
    #[error("Link busy")]
    Busy,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport not supported: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// Busy is an expected outcome of the one-command-in-flight policy
    pub fn is_busy(&self) -> bool {
        matches!(self, TransportError::Busy)
    }
}
