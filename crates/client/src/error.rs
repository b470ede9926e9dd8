//! Client-side error type.

use hirewire_shared::{ApiError, FrameError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The transport is not CONNECTED; the frame was dropped.
    #[error("not connected")]
    NotConnected,

    /// A broker capability was used outside an active session.
    #[error("realtime session not initialized")]
    NotInitialized,

    /// No authenticated identity is available to start a session.
    #[error("no authenticated session")]
    NoSession,

    #[error("message content must not be empty")]
    EmptyMessage,

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RealtimeError {
    /// True when the action was dropped because the transport was down.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, RealtimeError::NotConnected)
    }
}
