//! PubSub user registration.
//!
//! Topic subscriptions are keyed by user id, so registering a provider means
//! resolving which user its token belongs to.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::api::{VALIDATE_URL, validate_access_token};
use crate::auth::AuthProvider;
use crate::error::{Result, TwitchError};

/// Registry of users whose topics may be listened to.
pub struct PubSubClient {
    http: reqwest::Client,
    validate_url: String,
    users: RwLock<HashMap<String, Arc<dyn AuthProvider>>>,
}

impl Default for PubSubClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSubClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            validate_url: VALIDATE_URL.to_string(),
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Override the token introspection endpoint (useful for testing).
    pub fn with_validate_url(mut self, url: impl Into<String>) -> Self {
        self.validate_url = url.into();
        self
    }

    /// Register the user that `auth` belongs to and return its user id.
    ///
    /// Registering the same user again replaces its provider.
    pub async fn register_user_listener(&self, auth: Arc<dyn AuthProvider>) -> Result<String> {
        let token = auth.access_token().await?;
        let info = validate_access_token(&self.http, &self.validate_url, &token).await?;
        let user_id = info
            .user_id
            .ok_or_else(|| TwitchError::auth("pubsub requires a user access token"))?;

        info!(%user_id, login = ?info.login, "Registered PubSub user");
        self.users.write().insert(user_id.clone(), auth);
        Ok(user_id)
    }

    /// Forget a registered user. Returns `false` if it was not registered.
    pub fn remove_user_listener(&self, user_id: &str) -> bool {
        self.users.write().remove(user_id).is_some()
    }

    pub fn registered_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users.read().keys().cloned().collect();
        users.sort();
        users
    }
}

impl std::fmt::Debug for PubSubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubClient")
            .field("users", &self.registered_users())
            .finish_non_exhaustive()
    }
}
