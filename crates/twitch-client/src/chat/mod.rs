//! Twitch chat over IRC/WebSocket.

mod client;
mod event;
mod irc;
mod listener;
mod transport;

pub use client::{ChatClient, ChatClientConfig, ReconnectConfig, TWITCH_WS_URL};
pub use event::{ChatEvent, ChatEventKind};
pub use irc::{IrcMessage, to_channel, to_user_name};
pub use listener::{ChatHandler, Listener, ListenerRegistry};
pub use transport::{ChatTransport, SayAttributes};
