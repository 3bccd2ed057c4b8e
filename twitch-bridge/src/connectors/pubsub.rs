//! PubSub connector.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};
use twitch_client::PubSubClient;
use twitch_client::api::VALIDATE_URL;

use super::{Connector, ConnectorError};
use crate::credentials::{BOT_IDENTITY, CredentialStore};

struct Registration {
    client: Arc<PubSubClient>,
    user_id: String,
}

/// Registers the bot user with PubSub.
pub struct PubsubConnector {
    store: Arc<CredentialStore>,
    validate_url: String,
    registration: RwLock<Option<Registration>>,
}

impl PubsubConnector {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self {
            store,
            validate_url: VALIDATE_URL.to_string(),
            registration: RwLock::new(None),
        }
    }

    /// Override the token introspection endpoint (useful for testing).
    pub fn with_validate_url(mut self, url: impl Into<String>) -> Self {
        self.validate_url = url.into();
        self
    }

    /// User id the bot token belongs to, once registered.
    pub fn user_id(&self) -> Option<String> {
        self.registration.read().as_ref().map(|r| r.user_id.clone())
    }

    pub fn client(&self) -> Option<Arc<PubSubClient>> {
        self.registration.read().as_ref().map(|r| r.client.clone())
    }
}

#[async_trait]
impl Connector for PubsubConnector {
    fn name(&self) -> &'static str {
        "pubsub"
    }

    async fn start(&self) -> Result<(), ConnectorError> {
        if self.registration.read().is_some() {
            debug!("PubSub connector already started");
            return Ok(());
        }
        let handle = self
            .store
            .get(BOT_IDENTITY)
            .ok_or_else(|| ConnectorError::missing_credentials(BOT_IDENTITY))?;

        let client = Arc::new(PubSubClient::new().with_validate_url(self.validate_url.clone()));
        let user_id = client.register_user_listener(handle.auth()).await?;
        info!(%user_id, "PubSub connector started");
        *self.registration.write() = Some(Registration { client, user_id });
        Ok(())
    }

    async fn stop(&self) -> Result<(), ConnectorError> {
        let registration = self.registration.write().take();
        if let Some(registration) = registration {
            registration.client.remove_user_listener(&registration.user_id);
            info!(user_id = %registration.user_id, "PubSub connector stopped");
        }
        Ok(())
    }
}
