use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::ChatEventKind;
use super::listener::{ChatHandler, Listener};
use crate::error::Result;

/// Extra options for a chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SayAttributes {
    /// Id of the message being replied to.
    #[serde(rename = "replyTo", default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// A live chat connection.
///
/// Sends are fire-and-forget: delivery failures are reported asynchronously
/// through `messageFailed` / `messageRatelimit` events, not through the
/// returned `Result`.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Identity of this transport instance.
    fn id(&self) -> Uuid;

    /// Open the connection. Resolves once the socket is up and logged in.
    async fn connect(&self) -> Result<()>;

    /// Close the connection. Calling it on a closed transport is a no-op.
    async fn quit(&self) -> Result<()>;

    async fn join(&self, channel: &str) -> Result<()>;

    async fn say(
        &self,
        channel: &str,
        message: &str,
        attributes: Option<&SayAttributes>,
    ) -> Result<()>;

    async fn whisper(&self, user: &str, message: &str) -> Result<()>;

    fn add_listener(&self, kind: ChatEventKind, handler: ChatHandler) -> Listener;

    /// Returns `false` if the handle is unknown to this transport.
    fn remove_listener(&self, listener: &Listener) -> bool;
}
