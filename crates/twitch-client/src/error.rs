//! Twitch client error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, TwitchError>;

/// Errors that can occur while talking to Twitch.
#[derive(Error, Debug)]
pub enum TwitchError {
    /// Connection-related errors (WebSocket, IRC, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Protocol parsing/encoding errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Token acquisition or refresh failed
    #[error("Auth error: {0}")]
    Auth(String),

    /// HTTP errors from the ID / Helix endpoints
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket transport errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TwitchError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an auth error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Check if this error is transient and may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::WebSocket(_) | Self::Io(_))
            || matches!(self, Self::Http(e) if e.is_timeout() || e.is_connect())
    }
}
