//! Chat connector.
//!
//! Owns one live [`ChatTransport`], publishes every transport event on its
//! `v1.chat.*` topic and forwards validated join/say/whisper calls.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex as SyncMutex, RwLock};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use twitch_client::{
    AuthProvider, ChatClient, ChatClientConfig, ChatEvent, ChatEventKind, ChatHandler,
    ChatTransport, Listener, SayAttributes,
};

use super::{ConnectionState, Connector, ConnectorError};
use crate::bus::{BusError, EventBus};
use crate::credentials::{BOT_IDENTITY, CredentialStore};
use crate::schema::{self, SchemaRegistry, ValidationError};

mod translate;

pub use translate::translate;

/// Builds a transport for a provider.
pub trait TransportFactory: Send + Sync {
    fn create(&self, auth: Arc<dyn AuthProvider>) -> Arc<dyn ChatTransport>;
}

impl<F> TransportFactory for F
where
    F: Fn(Arc<dyn AuthProvider>) -> Arc<dyn ChatTransport> + Send + Sync,
{
    fn create(&self, auth: Arc<dyn AuthProvider>) -> Arc<dyn ChatTransport> {
        self(auth)
    }
}

/// Factory for real Twitch chat clients.
#[derive(Debug, Clone, Default)]
pub struct TwitchTransportFactory {
    config: ChatClientConfig,
}

impl TwitchTransportFactory {
    pub fn new(config: ChatClientConfig) -> Self {
        Self { config }
    }
}

impl TransportFactory for TwitchTransportFactory {
    fn create(&self, auth: Arc<dyn AuthProvider>) -> Arc<dyn ChatTransport> {
        Arc::new(ChatClient::with_config(auth, self.config.clone()))
    }
}

/// Listener handles registered on one transport instance.
pub struct ListenerSet {
    transport: Arc<dyn ChatTransport>,
    listeners: Vec<Listener>,
}

impl ListenerSet {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            listeners: Vec::new(),
        }
    }

    pub fn register(&mut self, kind: ChatEventKind, handler: ChatHandler) {
        let listener = self.transport.add_listener(kind, handler);
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Remove every handle from the transport. Returns how many were removed.
    ///
    /// Handles are consumed, so a second drain removes nothing.
    pub fn drain(&mut self) -> usize {
        let mut removed = 0;
        for listener in self.listeners.drain(..) {
            if self.transport.remove_listener(&listener) {
                removed += 1;
            } else {
                warn!(kind = %listener.kind, "Listener was already gone from transport");
            }
        }
        removed
    }
}

/// Parameters of `v1.chat.join`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JoinParams {
    pub channel: String,
}

/// Parameters of `v1.chat.say`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SayParams {
    pub channel: String,
    pub message: String,
    #[serde(default)]
    pub attributes: Option<SayAttributes>,
}

/// Parameters of `v1.chat.whisper`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WhisperParams {
    pub user: String,
    pub message: String,
}

/// Validate `params` against schema `name` and decode them.
fn parse_params<T: DeserializeOwned>(
    schemas: &SchemaRegistry,
    name: &str,
    params: &Value,
) -> Result<T, ValidationError> {
    schemas.check(name, params)?;
    serde_json::from_value(params.clone())
        .map_err(|e| ValidationError::single(name, "", e.to_string()))
}

fn next_state(event: &ChatEvent) -> Option<ConnectionState> {
    match event {
        ChatEvent::Connect => Some(ConnectionState::Connected),
        ChatEvent::Register => Some(ConnectionState::Registered),
        ChatEvent::Disconnect { .. } => Some(ConnectionState::Disconnected),
        _ => None,
    }
}

struct Active {
    transport: Arc<dyn ChatTransport>,
    listeners: ListenerSet,
}

/// Bridges a chat transport onto the event bus.
pub struct ChatConnector {
    store: Arc<CredentialStore>,
    bus: Arc<EventBus>,
    schemas: Arc<SchemaRegistry>,
    factory: Arc<dyn TransportFactory>,
    state: Arc<RwLock<ConnectionState>>,
    active: Mutex<Option<Active>>,
    /// Cancelled by `stop` to abandon a pending connect.
    starting: SyncMutex<Option<CancellationToken>>,
    /// First publish failure seen by a listener.
    fault: Arc<SyncMutex<Option<BusError>>>,
    /// Cancelled when a publish fails.
    fault_signal: CancellationToken,
}

impl ChatConnector {
    pub fn new(
        store: Arc<CredentialStore>,
        bus: Arc<EventBus>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let schemas = bus.schemas().clone();
        Self {
            store,
            bus,
            schemas,
            factory,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            active: Mutex::new(None),
            starting: SyncMutex::new(None),
            fault: Arc::new(SyncMutex::new(None)),
            fault_signal: CancellationToken::new(),
        }
    }

    /// Cancel `token` when an event cannot be published.
    pub fn with_fault_signal(mut self, token: CancellationToken) -> Self {
        self.fault_signal = token;
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Take the first publish failure recorded since the last call.
    pub fn take_fault(&self) -> Option<BusError> {
        self.fault.lock().take()
    }

    /// Number of listeners currently registered by this connector.
    pub async fn listener_count(&self) -> usize {
        self.active
            .lock()
            .await
            .as_ref()
            .map_or(0, |active| active.listeners.len())
    }

    fn handler(&self) -> ChatHandler {
        let bus = self.bus.clone();
        let state = self.state.clone();
        let fault = self.fault.clone();
        let fault_signal = self.fault_signal.clone();
        Arc::new(move |event: &ChatEvent| {
            if let Some(next) = next_state(event) {
                *state.write() = next;
            }
            translate::log_lifecycle(event);

            let (topic, payload) = translate(event);
            if let Err(e) = bus.publish(topic, payload) {
                error!(kind = %event.kind(), error = %e, "Failed to publish chat event");
                fault.lock().get_or_insert(e);
                fault_signal.cancel();
            }
        })
    }

    /// Build a transport, register listeners and connect.
    ///
    /// A concurrent [`stop`](Self::stop) abandons the connect and the call
    /// returns [`ConnectorError::Stopped`].
    pub async fn start(&self) -> Result<(), ConnectorError> {
        let (handle, cancel) = {
            let active = self.active.lock().await;
            let mut starting = self.starting.lock();
            if active.is_some() || starting.is_some() {
                debug!("Chat connector already started");
                return Ok(());
            }
            let handle = self
                .store
                .get(BOT_IDENTITY)
                .ok_or_else(|| ConnectorError::missing_credentials(BOT_IDENTITY))?;
            let cancel = CancellationToken::new();
            *starting = Some(cancel.clone());
            (handle, cancel)
        };

        *self.state.write() = ConnectionState::Connecting;
        let transport = self.factory.create(handle.auth());
        let mut listeners = ListenerSet::new(transport.clone());
        for kind in ChatEventKind::ALL {
            listeners.register(kind, self.handler());
        }
        debug!(count = listeners.len(), transport = %transport.id(), "Registered chat listeners");

        let connected = tokio::select! {
            result = transport.connect() => Some(result),
            _ = cancel.cancelled() => None,
        };

        let mut active = self.active.lock().await;
        if !cancel.is_cancelled() {
            // Still ours: `stop` takes the token before cancelling it.
            self.starting.lock().take();
        }
        match connected {
            Some(Ok(())) if !cancel.is_cancelled() => {
                info!(transport = %transport.id(), "Chat connector started");
                *active = Some(Active {
                    transport,
                    listeners,
                });
                Ok(())
            }
            Some(Err(e)) => {
                error!(error = %e, "Failed to connect chat transport");
                listeners.drain();
                *self.state.write() = ConnectionState::Disconnected;
                Err(ConnectorError::TransportConnect(e))
            }
            stopped => {
                if stopped.is_some()
                    && let Err(e) = transport.quit().await
                {
                    warn!(error = %e, "Failed to quit chat transport");
                }
                let removed = listeners.drain();
                *self.state.write() = ConnectionState::Disconnected;
                info!(removed, "Chat connector stopped while connecting");
                Err(ConnectorError::Stopped)
            }
        }
    }

    /// Quit the transport and remove every listener.
    pub async fn stop(&self) -> Result<(), ConnectorError> {
        if let Some(pending) = self.starting.lock().take() {
            debug!("Cancelling pending chat connect");
            pending.cancel();
        }

        let active = self.active.lock().await.take();
        let Some(mut active) = active else {
            debug!("Chat connector already stopped");
            return Ok(());
        };

        let quit = active.transport.quit().await;
        let removed = active.listeners.drain();
        *self.state.write() = ConnectionState::Disconnected;
        info!(removed, "Chat connector stopped");

        quit.map_err(ConnectorError::Transport)
    }

    async fn transport(&self) -> Result<Arc<dyn ChatTransport>, ConnectorError> {
        let state = self.state();
        if !state.is_ready() {
            return Err(ConnectorError::not_ready(state));
        }
        self.active
            .lock()
            .await
            .as_ref()
            .map(|active| active.transport.clone())
            .ok_or(ConnectorError::not_ready(ConnectionState::Disconnected))
    }

    pub async fn join(&self, params: &Value) -> Result<(), ConnectorError> {
        let params: JoinParams = parse_params(&self.schemas, schema::JOIN, params)?;
        let transport = self.transport().await?;
        debug!(channel = %params.channel, "Joining channel");
        transport.join(&params.channel).await?;
        Ok(())
    }

    pub async fn say(&self, params: &Value) -> Result<(), ConnectorError> {
        let params: SayParams = parse_params(&self.schemas, schema::SAY, params)?;
        let transport = self.transport().await?;
        transport
            .say(&params.channel, &params.message, params.attributes.as_ref())
            .await?;
        Ok(())
    }

    pub async fn whisper(&self, params: &Value) -> Result<(), ConnectorError> {
        let params: WhisperParams = parse_params(&self.schemas, schema::WHISPER, params)?;
        let transport = self.transport().await?;
        transport.whisper(&params.user, &params.message).await?;
        Ok(())
    }
}

#[async_trait]
impl Connector for ChatConnector {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn start(&self) -> Result<(), ConnectorError> {
        ChatConnector::start(self).await
    }

    async fn stop(&self) -> Result<(), ConnectorError> {
        ChatConnector::stop(self).await
    }
}
