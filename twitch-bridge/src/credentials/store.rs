//! Process-wide registry of named identities.
//!
//! Each identity owns one refreshing auth provider. Consumers share the
//! provider through a [`CredentialHandle`]; the store never creates a second
//! provider for an id it already knows.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, error, info};
use twitch_client::{AccessToken, AuthProvider, RefreshConfig, RefreshingAuthProvider};

use super::error::CredentialError;
use super::types::{AuthOptions, TokenSnapshot};
use crate::bus::{EventBus, Topic};
use crate::schema::{self, SchemaRegistry};

/// A named identity and its token state.
pub struct Identity {
    id: String,
    provider: Arc<RefreshingAuthProvider>,
    token: RwLock<TokenSnapshot>,
}

impl Identity {
    /// Replace the token snapshot in one step.
    fn apply_refresh(&self, token: &AccessToken) {
        *self.token.write() = TokenSnapshot::from(token);
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("token", &*self.token.read())
            .finish_non_exhaustive()
    }
}

/// Shared reference to an identity.
#[derive(Clone, Debug)]
pub struct CredentialHandle(Arc<Identity>);

impl CredentialHandle {
    pub fn id(&self) -> &str {
        &self.0.id
    }

    /// The shared refreshing provider.
    pub fn provider(&self) -> Arc<RefreshingAuthProvider> {
        self.0.provider.clone()
    }

    /// The provider as a trait object, for platform clients.
    pub fn auth(&self) -> Arc<dyn AuthProvider> {
        self.0.provider.clone()
    }

    /// Consistent copy of the current token state.
    pub fn token(&self) -> TokenSnapshot {
        self.0.token.read().clone()
    }

    /// Whether both handles refer to the same identity record.
    pub fn ptr_eq(&self, other: &CredentialHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Registry of identities keyed by id.
pub struct CredentialStore {
    records: DashMap<String, Arc<Identity>>,
    bus: Arc<EventBus>,
    schemas: Arc<SchemaRegistry>,
    token_url: String,
}

impl CredentialStore {
    pub fn new(bus: Arc<EventBus>) -> Self {
        let schemas = bus.schemas().clone();
        Self {
            records: DashMap::new(),
            bus,
            schemas,
            token_url: twitch_client::auth::TOKEN_URL.to_string(),
        }
    }

    /// Override the token endpoint (useful for testing).
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Get the identity `id`, creating it from `options` if it does not exist.
    ///
    /// Options are ignored for an existing identity. Creation holds the map
    /// entry, so concurrent callers for the same unseen id get one record.
    pub fn get_or_create(
        &self,
        id: &str,
        options: Option<AuthOptions>,
    ) -> Result<CredentialHandle, CredentialError> {
        match self.records.entry(id.to_string()) {
            Entry::Occupied(entry) => {
                debug!(id, "Reusing existing identity");
                Ok(CredentialHandle(entry.get().clone()))
            }
            Entry::Vacant(entry) => {
                let options = options.ok_or_else(|| CredentialError::missing(id))?;
                let params = serde_json::to_value(&options).unwrap_or_default();
                self.schemas.check(schema::AUTH_OPTIONS, &params)?;

                let identity = self.build_identity(id, options);
                entry.insert(identity.clone());
                info!(id, "Created identity");
                Ok(CredentialHandle(identity))
            }
        }
    }

    fn build_identity(&self, id: &str, options: AuthOptions) -> Arc<Identity> {
        let config = RefreshConfig::new(options.client_id, options.client_secret)
            .with_token_url(self.token_url.clone());
        let provider = Arc::new(RefreshingAuthProvider::new(
            config,
            AccessToken::expired(options.refresh_token),
        ));

        let identity = Arc::new(Identity {
            id: id.to_string(),
            provider: provider.clone(),
            token: RwLock::new(TokenSnapshot::default()),
        });

        let weak: Weak<Identity> = Arc::downgrade(&identity);
        let bus = self.bus.clone();
        provider.on_refresh(Arc::new(move |token: &AccessToken| {
            let Some(identity) = weak.upgrade() else {
                return;
            };
            identity.apply_refresh(token);
            debug!(id = %identity.id, expires_in = ?token.expires_in, "Identity token refreshed");
            if let Err(e) = bus.publish(Topic::auth("refreshed"), json!({ "instance": identity.id }))
            {
                error!(id = %identity.id, error = %e, "Failed to publish refresh event");
            }
        }));

        identity
    }

    pub fn exists(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<CredentialHandle> {
        self.records
            .get(id)
            .map(|entry| CredentialHandle(entry.value().clone()))
    }

    /// Known identity ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
