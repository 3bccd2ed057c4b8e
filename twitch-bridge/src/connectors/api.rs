//! Helix API connector.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};
use twitch_client::api::{HELIX_URL, VALIDATE_URL};
use twitch_client::{ApiClient, HelixUser, TokenInfo};

use super::{ConnectionState, Connector, ConnectorError};
use crate::credentials::{BOT_IDENTITY, CredentialStore};

/// REST client bound to the bot identity.
pub struct ApiConnector {
    store: Arc<CredentialStore>,
    helix_url: String,
    validate_url: String,
    client: RwLock<Option<Arc<ApiClient>>>,
}

impl ApiConnector {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self {
            store,
            helix_url: HELIX_URL.to_string(),
            validate_url: VALIDATE_URL.to_string(),
            client: RwLock::new(None),
        }
    }

    /// Override the endpoints (useful for testing).
    pub fn with_base_urls(
        mut self,
        helix_url: impl Into<String>,
        validate_url: impl Into<String>,
    ) -> Self {
        self.helix_url = helix_url.into();
        self.validate_url = validate_url.into();
        self
    }

    pub fn is_started(&self) -> bool {
        self.client.read().is_some()
    }

    /// The started client.
    pub fn client(&self) -> Result<Arc<ApiClient>, ConnectorError> {
        self.client
            .read()
            .clone()
            .ok_or(ConnectorError::not_ready(ConnectionState::Disconnected))
    }

    /// Introspect the bot's current token.
    pub async fn validate_token(&self) -> Result<TokenInfo, ConnectorError> {
        let client = self.client()?;
        Ok(client.validate_token().await?)
    }

    pub async fn get_users_by_logins(&self, logins: &[&str]) -> Result<Vec<HelixUser>, ConnectorError> {
        let client = self.client()?;
        Ok(client.get_users_by_logins(logins).await?)
    }
}

#[async_trait]
impl Connector for ApiConnector {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn start(&self) -> Result<(), ConnectorError> {
        if self.is_started() {
            debug!("API connector already started");
            return Ok(());
        }
        let handle = self
            .store
            .get(BOT_IDENTITY)
            .ok_or_else(|| ConnectorError::missing_credentials(BOT_IDENTITY))?;
        let client = ApiClient::new(handle.auth())
            .with_base_urls(self.helix_url.clone(), self.validate_url.clone());
        *self.client.write() = Some(Arc::new(client));
        info!("API connector started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ConnectorError> {
        if self.client.write().take().is_some() {
            info!("API connector stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::credentials::AuthOptions;
    use crate::schema::SchemaRegistry;
    use twitch_client::AuthProvider;

    fn store() -> Arc<CredentialStore> {
        Arc::new(CredentialStore::new(Arc::new(EventBus::new(Arc::new(
            SchemaRegistry::twitch(),
        )))))
    }

    #[tokio::test]
    async fn test_start_requires_bot() {
        let connector = ApiConnector::new(store());
        let err = connector.start().await.unwrap_err();
        assert!(matches!(err, ConnectorError::MissingCredentials { ref id } if id == "bot"));
        assert!(matches!(
            connector.validate_token().await,
            Err(ConnectorError::NotReady { .. })
        ));
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let store = store();
        store
            .get_or_create(
                BOT_IDENTITY,
                Some(AuthOptions {
                    client_id: "a".repeat(30),
                    client_secret: "b".repeat(30),
                    refresh_token: None,
                }),
            )
            .unwrap();

        let connector = ApiConnector::new(store);
        connector.start().await.unwrap();
        let first = connector.client().unwrap();
        connector.start().await.unwrap();
        assert!(Arc::ptr_eq(&first, &connector.client().unwrap()));
        assert_eq!(first.auth().client_id(), "a".repeat(30));

        connector.stop().await.unwrap();
        connector.stop().await.unwrap();
        assert!(!connector.is_started());
    }
}
