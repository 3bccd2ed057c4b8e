//! IRC-over-WebSocket chat client.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex as SyncMutex;
use rand::RngExt;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::event::{ChatEvent, ChatEventKind};
use super::irc::{
    IrcMessage, check_param, check_trailing, escape_tag_value, to_channel, to_user_name,
};
use super::listener::{ChatHandler, Listener, ListenerRegistry};
use super::transport::{ChatTransport, SayAttributes};
use crate::api::{VALIDATE_URL, validate_access_token};
use crate::auth::AuthProvider;
use crate::error::{Result, TwitchError};

/// Twitch WebSocket IRC server URL
pub const TWITCH_WS_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Capabilities requested after connecting.
const CAPABILITIES: &str = "twitch.tv/tags twitch.tv/commands twitch.tv/membership";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reconnect backoff settings.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1000,
            max_delay_ms: 60000,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnect attempt `attempt` (0-indexed), with jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let capped = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);

        let jitter_limit = (self.base_delay_ms / 2).min(self.max_delay_ms - capped);
        if jitter_limit == 0 {
            return Duration::from_millis(capped);
        }
        let jitter = rand::rng().random_range(0..jitter_limit);
        Duration::from_millis(capped + jitter)
    }
}

/// Settings for a [`ChatClient`].
#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    pub url: String,
    pub validate_url: String,
    /// Login name; resolved from the token when `None`.
    pub nick: Option<String>,
    pub reconnect: ReconnectConfig,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            url: TWITCH_WS_URL.to_string(),
            validate_url: VALIDATE_URL.to_string(),
            nick: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

struct Inner {
    auth: Arc<dyn AuthProvider>,
    config: ChatClientConfig,
    http: reqwest::Client,
    listeners: ListenerRegistry,
    /// Channels to re-join after a reconnect.
    channels: SyncMutex<BTreeSet<String>>,
}

struct Session {
    outbound: mpsc::UnboundedSender<String>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

/// Authenticated Twitch chat connection.
///
/// A single reader task owns the socket; every listener callback runs on that
/// task, so events are delivered in the order they were received.
pub struct ChatClient {
    inner: Arc<Inner>,
    session: Mutex<Option<Session>>,
}

impl ChatClient {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self::with_config(auth, ChatClientConfig::default())
    }

    pub fn with_config(auth: Arc<dyn AuthProvider>, config: ChatClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                auth,
                config,
                http: reqwest::Client::new(),
                listeners: ListenerRegistry::new(Uuid::new_v4()),
                channels: SyncMutex::new(BTreeSet::new()),
            }),
            session: Mutex::new(None),
        }
    }

    /// Channels currently joined (or to be joined on connect).
    pub fn channels(&self) -> Vec<String> {
        self.inner.channels.lock().iter().cloned().collect()
    }

    async fn send_line(&self, line: String) -> Result<()> {
        let session = self.session.lock().await;
        let session = session
            .as_ref()
            .ok_or_else(|| TwitchError::connection("chat client is not connected"))?;
        session
            .outbound
            .send(line)
            .map_err(|_| TwitchError::connection("chat connection closed"))
    }
}

impl Inner {
    /// Open a socket, log in and re-join known channels.
    async fn open(&self) -> Result<WsStream> {
        let token = self.auth.access_token().await?;
        let nick = match &self.config.nick {
            Some(nick) => nick.clone(),
            None => validate_access_token(&self.http, &self.config.validate_url, &token)
                .await?
                .login
                .ok_or_else(|| TwitchError::auth("chat requires a user access token"))?,
        };

        info!(url = %self.config.url, %nick, "Connecting to Twitch chat");
        let (mut ws, _) = connect_async(self.config.url.as_str()).await?;

        let mut lines = vec![
            format!("CAP REQ :{CAPABILITIES}"),
            format!("PASS oauth:{token}"),
            format!("NICK {nick}"),
        ];
        let channels: Vec<String> = self.channels.lock().iter().cloned().collect();
        lines.extend(channels.into_iter().map(|c| format!("JOIN {c}")));
        for line in lines {
            ws.send(Message::Text(line.into())).await?;
        }
        Ok(ws)
    }

    async fn reconnect(&self, shutdown_rx: &mut mpsc::Receiver<()>) -> Option<WsStream> {
        let config = self.config.reconnect;
        for attempt in 0..config.max_attempts {
            let delay = config.delay_for_attempt(attempt);
            debug!(attempt = attempt + 1, ?delay, "Reconnecting to Twitch chat");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.recv() => return None,
            }
            tokio::select! {
                result = self.open() => match result {
                    Ok(ws) => return Some(ws),
                    Err(e) if e.is_transient() => warn!(error = %e, "Reconnect attempt failed"),
                    Err(e) => {
                        error!(error = %e, "Giving up on Twitch chat reconnect");
                        return None;
                    }
                },
                _ = shutdown_rx.recv() => return None,
            }
        }
        error!(
            attempts = config.max_attempts,
            "Max reconnect attempts reached for Twitch chat"
        );
        None
    }

    /// Handle one text frame. Returns a disconnect reason when the connection must be dropped.
    async fn handle_text(&self, ws: &mut WsStream, text: &str) -> Option<String> {
        for line in text.split("\r\n").filter(|l| !l.is_empty()) {
            trace!(line, "IRC <");
            let Some(msg) = IrcMessage::parse(line) else {
                continue;
            };
            match msg.command.as_str() {
                "PING" => {
                    let pong = format!("PONG :{}", msg.param(0).unwrap_or("tmi.twitch.tv"));
                    if let Err(e) = ws.send(Message::Text(pong.into())).await {
                        return Some(e.to_string());
                    }
                }
                "RECONNECT" => return Some("server requested reconnect".to_string()),
                "NOTICE" if msg.param(1) == Some("Login authentication failed") => {
                    return Some("login authentication failed".to_string());
                }
                _ => {
                    if let Some(event) = ChatEvent::from_irc(&msg) {
                        self.listeners.dispatch(&event);
                    }
                }
            }
        }
        None
    }

    async fn run(
        self: Arc<Self>,
        mut ws: WsStream,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        loop {
            let reason = loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => {
                        let _ = ws.close(None).await;
                        debug!("Chat reader task stopped");
                        return;
                    }

                    Some(line) = outbound_rx.recv() => {
                        trace!(line = %line, "IRC >");
                        if let Err(e) = ws.send(Message::Text(line.into())).await {
                            break Some(e.to_string());
                        }
                    }

                    frame = ws.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reason) = self.handle_text(&mut ws, text.as_str()).await {
                                break Some(reason);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break Some(close_reason(frame));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Some(e.to_string()),
                        None => break Some("connection closed".to_string()),
                    },
                }
            };

            warn!(reason = ?reason, "Twitch chat disconnected");
            self.listeners.dispatch(&ChatEvent::Disconnect {
                manually: false,
                reason,
            });

            match self.reconnect(&mut shutdown_rx).await {
                Some(next) => {
                    ws = next;
                    info!("Reconnected to Twitch chat");
                    self.listeners.dispatch(&ChatEvent::Connect);
                }
                None => return,
            }
        }
    }
}

/// Build a `PRIVMSG` line, tagging it as a reply when requested.
fn say_line(channel: &str, message: &str, attributes: Option<&SayAttributes>) -> Result<String> {
    check_param("channel", channel)?;
    check_trailing("message", message)?;
    let channel = to_channel(channel);
    match attributes.and_then(|a| a.reply_to.as_deref()) {
        Some(parent) => {
            check_trailing("replyTo", parent)?;
            let parent = escape_tag_value(parent);
            Ok(format!("@reply-parent-msg-id={parent} PRIVMSG {channel} :{message}"))
        }
        None => Ok(format!("PRIVMSG {channel} :{message}")),
    }
}

/// Disconnect reason for a close frame sent by the server. Never empty.
fn close_reason(frame: Option<CloseFrame>) -> String {
    match frame {
        Some(frame) if !frame.reason.is_empty() => frame.reason.as_str().to_string(),
        Some(frame) => format!("closed by server (code {})", u16::from(frame.code)),
        None => "connection closed by server".to_string(),
    }
}

#[async_trait]
impl ChatTransport for ChatClient {
    fn id(&self) -> Uuid {
        self.inner.listeners.transport_id()
    }

    async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            debug!("Chat client already connected");
            return Ok(());
        }

        let ws = self.inner.open().await?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        self.inner.listeners.dispatch(&ChatEvent::Connect);
        let task = tokio::spawn(self.inner.clone().run(ws, outbound_rx, shutdown_rx));

        *session = Some(Session {
            outbound,
            shutdown_tx,
            task,
        });
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };
        let _ = session.shutdown_tx.try_send(());
        if let Err(e) = session.task.await {
            warn!(error = %e, "Chat reader task ended abnormally");
        }
        info!("Disconnected from Twitch chat");
        self.inner.listeners.dispatch(&ChatEvent::Disconnect {
            manually: true,
            reason: None,
        });
        Ok(())
    }

    async fn join(&self, channel: &str) -> Result<()> {
        check_param("channel", channel)?;
        let channel = to_channel(channel);
        self.inner.channels.lock().insert(channel.clone());
        self.send_line(format!("JOIN {channel}")).await
    }

    async fn say(
        &self,
        channel: &str,
        message: &str,
        attributes: Option<&SayAttributes>,
    ) -> Result<()> {
        let line = say_line(channel, message, attributes)?;
        self.send_line(line).await
    }

    async fn whisper(&self, user: &str, message: &str) -> Result<()> {
        check_param("user", user)?;
        check_trailing("message", message)?;
        let user = to_user_name(user).to_lowercase();
        self.send_line(format!("PRIVMSG #jtv :/w {user} {message}"))
            .await
    }

    fn add_listener(&self, kind: ChatEventKind, handler: ChatHandler) -> Listener {
        self.inner.listeners.add(kind, handler)
    }

    fn remove_listener(&self, listener: &Listener) -> bool {
        self.inner.listeners.remove(listener)
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("id", &self.inner.listeners.transport_id())
            .field("url", &self.inner.config.url)
            .field("listeners", &self.inner.listeners.len())
            .finish_non_exhaustive()
    }
}
