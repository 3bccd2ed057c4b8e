//! Service container for dependency injection.
//!
//! The ServiceContainer holds references to all bridge services and manages
//! their lifecycle: the auth service starts before the connectors that use
//! its identity and stops after them.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use twitch_client::ChatClientConfig;

use crate::bus::{EventBus, Subscription, Topic, VERSION};
use crate::config::BridgeConfig;
use crate::connectors::chat::{TransportFactory, TwitchTransportFactory};
use crate::connectors::{
    ApiConnector, ChatConnector, Connector, ConnectorError, PubsubConnector,
};
use crate::credentials::{AuthService, BOT_IDENTITY, CredentialHandle, CredentialStore};
use crate::database::{DEFAULT_POOL, PoolRegistry};
use crate::schema::{self, SchemaRegistry};
use crate::{Error, Result};

/// Default shutdown timeout.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Service container holding all bridge services.
pub struct ServiceContainer {
    config: BridgeConfig,
    /// Operation and event schemas.
    pub schemas: Arc<SchemaRegistry>,
    /// Event bus shared by every service.
    pub bus: Arc<EventBus>,
    /// Named identities.
    pub credentials: Arc<CredentialStore>,
    /// Bot identity lifecycle.
    pub auth: AuthService,
    pub chat: Arc<ChatConnector>,
    pub api: Arc<ApiConnector>,
    pub pubsub: Arc<PubsubConnector>,
    /// Shared database pools.
    pub pools: PoolRegistry,
    /// Cancelled on shutdown or when a connector fails to publish an event.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Create a container that talks to Twitch chat.
    pub fn new(config: BridgeConfig) -> Self {
        let chat_config = ChatClientConfig {
            url: config.endpoints.chat_url.clone(),
            validate_url: config.endpoints.validate_url.clone(),
            ..ChatClientConfig::default()
        };
        Self::with_transport_factory(config, Arc::new(TwitchTransportFactory::new(chat_config)))
    }

    /// Create a container whose chat connector builds transports with `factory`.
    pub fn with_transport_factory(
        config: BridgeConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let schemas = Arc::new(SchemaRegistry::twitch());
        let bus = Arc::new(EventBus::new(schemas.clone()).with_node_id(config.node_id()));
        let credentials = Arc::new(
            CredentialStore::new(bus.clone()).with_token_url(config.endpoints.token_url.clone()),
        );
        let auth = AuthService::new(credentials.clone(), bus.clone(), config.auth_options());

        let cancellation_token = CancellationToken::new();
        let chat = Arc::new(
            ChatConnector::new(credentials.clone(), bus.clone(), factory)
                .with_fault_signal(cancellation_token.clone()),
        );
        let api = Arc::new(
            ApiConnector::new(credentials.clone()).with_base_urls(
                config.endpoints.helix_url.clone(),
                config.endpoints.validate_url.clone(),
            ),
        );
        let pubsub = Arc::new(
            PubsubConnector::new(credentials.clone())
                .with_validate_url(config.endpoints.validate_url.clone()),
        );

        Self {
            config,
            schemas,
            bus,
            credentials,
            auth,
            chat,
            api,
            pubsub,
            pools: PoolRegistry::new(),
            cancellation_token,
        }
    }

    /// Connectors in start order.
    fn connectors(&self) -> [Arc<dyn Connector>; 3] {
        [self.chat.clone(), self.api.clone(), self.pubsub.clone()]
    }

    /// Start all services.
    pub async fn start(&self) -> Result<()> {
        info!("Initializing services...");

        self.pools
            .get_or_connect(DEFAULT_POOL, &self.config.database_url)
            .await?;

        self.auth.start().await?;

        for connector in self.connectors() {
            info!(connector = connector.name(), "Starting connector...");
            connector.start().await?;
        }

        info!("All services initialized");
        Ok(())
    }

    /// Invoke an exposed action such as `v1.chat.say`.
    pub async fn call(&self, action: &str, params: Value) -> Result<()> {
        let topic = Topic::parse(action)
            .filter(|t| t.version == VERSION && t.domain == "chat")
            .ok_or_else(|| Error::unknown_action(action))?;

        match topic.event.as_str() {
            schema::JOIN => self.chat.join(&params).await?,
            schema::SAY => self.chat.say(&params).await?,
            schema::WHISPER => self.chat.whisper(&params).await?,
            _ => return Err(Error::unknown_action(action)),
        }
        Ok(())
    }

    /// Subscribe to bus topics matching `pattern`.
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        self.bus.subscribe_to(pattern)
    }

    /// The bot identity, once the auth service has started.
    pub fn bot(&self) -> Option<CredentialHandle> {
        self.credentials.get(BOT_IDENTITY)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Shutdown all services gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Shutdown all services gracefully with a custom timeout.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<()> {
        info!("Shutting down services (timeout: {:?})", timeout);

        let stop_connectors = async {
            for connector in self.connectors() {
                info!(connector = connector.name(), "Stopping connector...");
                if let Err(e) = connector.stop().await {
                    warn!(connector = connector.name(), error = %e, "Connector stopped with error");
                }
            }
        };
        if tokio::time::timeout(timeout, stop_connectors).await.is_err() {
            warn!("Shutdown timeout reached, forcing shutdown");
        }

        self.auth.stop().await;

        // Signal remaining background tasks to stop
        self.cancellation_token.cancel();

        info!("Closing database pools...");
        let closed = self.pools.close_all().await;
        info!(closed, "Services shut down");
        Ok(())
    }

    /// Get the cancellation token for external use.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// The fault that cancelled the container, if any.
    pub fn take_fault(&self) -> Option<Error> {
        self.chat
            .take_fault()
            .map(|e| Error::Connector(ConnectorError::Publish(e)))
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
