//! Twitch platform client used by twitch-bridge.
//!
//! - [`auth`]: refreshing OAuth token provider
//! - [`chat`]: IRC-over-WebSocket chat transport
//! - [`api`]: Helix and token introspection endpoints
//! - [`pubsub`]: PubSub user registration

pub mod api;
pub mod auth;
pub mod chat;
pub mod error;
pub mod pubsub;

pub use api::{ApiClient, HelixUser, TokenInfo};
pub use auth::{AccessToken, AuthProvider, RefreshCallback, RefreshConfig, RefreshingAuthProvider};
pub use chat::{
    ChatClient, ChatClientConfig, ChatEvent, ChatEventKind, ChatHandler, ChatTransport,
    IrcMessage, Listener, ReconnectConfig, SayAttributes,
};
pub use error::{Result, TwitchError};
pub use pubsub::PubSubClient;
