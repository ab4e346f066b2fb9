//! Engine error types

use thiserror::Error;

/// Errors surfaced by the sync engine
#[derive(Debug, Error)]
pub enum FeedError {
    /// The transport has no active connection
    #[error("not connected")]
    NotConnected,

    /// No response arrived within the caller-specified window
    #[error("request timed out")]
    Timeout,

    /// The transport dropped while the request was outstanding
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The server answered with an explicit error frame
    #[error("server error: {0}")]
    Server(String),

    /// A frame was not valid JSON or lacked a recognizable type
    #[error("invalid frame: {0}")]
    Parse(#[from] serde_json::Error),

    /// A recognized frame type carried a payload missing required fields
    #[error("malformed {0} payload")]
    Shape(&'static str),

    /// The pending request was dropped without ever settling
    #[error("request canceled")]
    Canceled,
}
