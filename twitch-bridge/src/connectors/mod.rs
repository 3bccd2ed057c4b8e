//! Connectors between the Twitch platform client and the event bus.
//!
//! Every connector obtains the bot identity from the credential store on
//! start. [`chat::ChatConnector`] keeps a live chat transport and publishes
//! its events; the API and PubSub connectors wrap the REST clients.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use twitch_client::TwitchError;

use crate::bus::BusError;
use crate::schema::ValidationError;

pub mod api;
pub mod chat;
pub mod pubsub;

pub use api::ApiConnector;
pub use chat::ChatConnector;
pub use pubsub::PubsubConnector;

/// Connection state of the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Registered,
}

impl ConnectionState {
    /// Whether outbound operations may be sent.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Connected | Self::Registered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Registered => "registered",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by connectors.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("No credentials for identity '{id}'")]
    MissingCredentials { id: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Connector is not ready (state: {state})")]
    NotReady { state: ConnectionState },

    #[error("Failed to connect transport: {0}")]
    TransportConnect(#[source] TwitchError),

    #[error("Connector was stopped while connecting")]
    Stopped,

    #[error("Transport error: {0}")]
    Transport(#[from] TwitchError),

    #[error("Failed to publish event: {0}")]
    Publish(#[from] BusError),
}

impl ConnectorError {
    pub fn missing_credentials(id: impl Into<String>) -> Self {
        Self::MissingCredentials { id: id.into() }
    }

    pub fn not_ready(state: ConnectionState) -> Self {
        Self::NotReady { state }
    }
}

/// A service started after the auth service and stopped before it.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn start(&self) -> Result<(), ConnectorError>;

    /// Stop the connector. Stopping a stopped connector is a no-op.
    async fn stop(&self) -> Result<(), ConnectorError>;
}
