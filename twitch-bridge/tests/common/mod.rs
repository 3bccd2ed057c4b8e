//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use twitch_bridge::config::{BridgeConfig, TwitchEndpoints};
use twitch_bridge::connectors::chat::TransportFactory;
use twitch_bridge::credentials::AuthOptions;
use twitch_client::chat::ListenerRegistry;
use twitch_client::{
    AuthProvider, ChatEvent, ChatEventKind, ChatHandler, ChatTransport, Listener, SayAttributes,
    TwitchError,
};
use uuid::Uuid;

pub const CLIENT_ID: &str = "abcdefghijklmnopqrstuvwxyz0123";
pub const CLIENT_SECRET: &str = "0123456789abcdefghijklmnopqrst";

pub fn auth_options() -> AuthOptions {
    AuthOptions {
        client_id: CLIENT_ID.to_string(),
        client_secret: CLIENT_SECRET.to_string(),
        refresh_token: Some("initial-refresh".to_string()),
    }
}

/// In-memory chat transport that records outbound calls.
pub struct FakeTransport {
    listeners: ListenerRegistry,
    calls: Mutex<Vec<String>>,
    connected: AtomicBool,
    mode: ConnectMode,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ConnectMode {
    Accept,
    Refuse,
    Hang,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(ConnectMode::Accept))
    }

    /// A transport whose `connect` always fails.
    pub fn refusing() -> Arc<Self> {
        Arc::new(Self::build(ConnectMode::Refuse))
    }

    /// A transport whose `connect` never completes.
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self::build(ConnectMode::Hang))
    }

    fn build(mode: ConnectMode) -> Self {
        Self {
            listeners: ListenerRegistry::new(Uuid::new_v4()),
            calls: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            mode,
        }
    }

    /// Deliver `event` to registered listeners as the remote side would.
    pub fn emit(&self, event: ChatEvent) {
        self.listeners.dispatch(&event);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    fn id(&self) -> Uuid {
        self.listeners.transport_id()
    }

    async fn connect(&self) -> twitch_client::Result<()> {
        self.record("connect".to_string());
        match self.mode {
            ConnectMode::Accept => {}
            ConnectMode::Refuse => return Err(TwitchError::connection("connection refused")),
            ConnectMode::Hang => std::future::pending::<()>().await,
        }
        self.connected.store(true, Ordering::SeqCst);
        self.listeners.dispatch(&ChatEvent::Connect);
        Ok(())
    }

    async fn quit(&self) -> twitch_client::Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.record("quit".to_string());
        self.listeners.dispatch(&ChatEvent::Disconnect {
            manually: true,
            reason: None,
        });
        Ok(())
    }

    async fn join(&self, channel: &str) -> twitch_client::Result<()> {
        self.record(format!("join {channel}"));
        Ok(())
    }

    async fn say(
        &self,
        channel: &str,
        message: &str,
        attributes: Option<&SayAttributes>,
    ) -> twitch_client::Result<()> {
        let reply = attributes
            .and_then(|a| a.reply_to.as_deref())
            .unwrap_or("-");
        self.record(format!("say {channel} {message} reply={reply}"));
        Ok(())
    }

    async fn whisper(&self, user: &str, message: &str) -> twitch_client::Result<()> {
        self.record(format!("whisper {user} {message}"));
        Ok(())
    }

    fn add_listener(&self, kind: ChatEventKind, handler: ChatHandler) -> Listener {
        self.listeners.add(kind, handler)
    }

    fn remove_listener(&self, listener: &Listener) -> bool {
        self.listeners.remove(listener)
    }
}

/// Factory that always hands out `transport`.
pub fn factory(transport: Arc<FakeTransport>) -> Arc<dyn TransportFactory> {
    Arc::new(move |_auth: Arc<dyn AuthProvider>| -> Arc<dyn ChatTransport> { transport.clone() })
}

/// Local HTTP server standing in for the Twitch token, validate and Helix endpoints.
///
/// The token endpoint hands out a distinct grant per call: call `n` returns
/// access token `t{n}`, refresh token `r{n}`, `expires_in` of `1000 + n` and
/// `n` scopes.
pub struct FakeTwitch {
    addr: SocketAddr,
    hits: Hits,
}

type Hits = Arc<Mutex<HashMap<String, usize>>>;

impl FakeTwitch {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Hits::default();

        let app = Router::new()
            .route("/oauth2/token", post(token))
            .route("/oauth2/validate", get(validate))
            .route("/helix/users", get(users))
            .layer(middleware::from_fn_with_state(hits.clone(), count_hits))
            .with_state(hits.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn endpoints(&self) -> TwitchEndpoints {
        TwitchEndpoints {
            token_url: self.url("/oauth2/token"),
            validate_url: self.url("/oauth2/validate"),
            helix_url: self.url("/helix"),
            chat_url: "ws://127.0.0.1:1".to_string(),
        }
    }

    /// Number of requests served for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().get(path).copied().unwrap_or(0)
    }
}

async fn count_hits(State(hits): State<Hits>, request: Request, next: Next) -> Response {
    *hits
        .lock()
        .entry(request.uri().path().to_string())
        .or_insert(0) += 1;
    next.run(request).await
}

async fn token(State(hits): State<Hits>) -> Json<Value> {
    let n = hits.lock().get("/oauth2/token").copied().unwrap_or(0);
    let scope: Vec<String> = (0..n).map(|i| format!("scope:{i}")).collect();
    Json(json!({
        "access_token": format!("t{n}"),
        "refresh_token": format!("r{n}"),
        "expires_in": 1000 + n,
        "scope": scope,
        "token_type": "bearer",
    }))
}

async fn validate() -> Json<Value> {
    Json(json!({
        "client_id": CLIENT_ID,
        "login": "bridgebot",
        "user_id": "1234",
        "scopes": ["chat:read", "chat:edit"],
        "expires_in": 14_000,
    }))
}

async fn users() -> Json<Value> {
    Json(json!({
        "data": [{ "id": "42", "login": "alice", "display_name": "Alice" }],
    }))
}

/// Configuration pointing at `server` with an in-memory database.
pub fn bridge_config(server: &FakeTwitch) -> BridgeConfig {
    let vars: HashMap<&str, &str> = [
        ("BROKER_TRANSPORTER_URI", "nats://localhost:4222"),
        ("TWITCH_CLIENT_ID", CLIENT_ID),
        ("TWITCH_CLIENT_SECRET", CLIENT_SECRET),
        ("TWITCH_REFRESH_TOKEN", "initial-refresh"),
        ("DATABASE_URL", "sqlite::memory:"),
    ]
    .into_iter()
    .collect();
    let mut config = BridgeConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
    config.endpoints = server.endpoints();
    config
}
