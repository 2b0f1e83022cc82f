//! Error types for the lobby core.

use thiserror::Error;

/// Errors that can occur while handling connections and inbound actions.
///
/// None of these are fatal to the process. The worst outcome for a single
/// connection is its own forced removal.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Username was blank after trimming, or too long.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Action referenced a connection that is not (or no longer) live.
    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    /// Inbound frame addressed a destination that does not exist.
    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    /// Chat content exceeded the configured limit.
    #[error("message too long: max {0} characters")]
    ContentTooLong(usize),

    /// Connection limit reached at accept time.
    #[error("connection limit reached: max {0} connections")]
    ConnectionLimit(usize),

    /// Outbound queue was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RealtimeError {
    /// Whether the error should be reported back to the originating client.
    ///
    /// Unknown connections cannot be answered: the link is already gone.
    pub fn is_reportable(&self) -> bool {
        !matches!(
            self,
            RealtimeError::UnknownConnection(_) | RealtimeError::ChannelClosed
        )
    }
}
