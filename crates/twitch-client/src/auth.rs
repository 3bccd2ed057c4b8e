//! Refreshing OAuth token provider.
//!
//! The provider owns one access token and exchanges it for a new one when it
//! is empty or about to expire. Every successful exchange is reported to the
//! registered `on_refresh` callbacks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::{Result, TwitchError};

/// Twitch OAuth token endpoint.
pub const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Tokens are refreshed this long before their nominal expiry.
const EXPIRY_MARGIN_MS: i64 = 60_000;

/// Token data owned by an auth provider.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// The bearer token; empty until the first refresh.
    pub access_token: String,
    /// Refresh token used for the next exchange.
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, as reported by the token endpoint.
    pub expires_in: Option<u64>,
    /// When the token was obtained (milliseconds since the Unix epoch).
    pub obtainment_timestamp: i64,
    /// Granted scopes.
    pub scope: Vec<String>,
}

impl AccessToken {
    /// An empty token that forces a refresh on first use.
    pub fn expired(refresh_token: Option<String>) -> Self {
        Self {
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            ..Self::default()
        }
    }

    /// Whether the token must be refreshed before use at `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        match self.expires_in {
            Some(secs) => {
                let lifetime_ms = i64::try_from(secs)
                    .unwrap_or(i64::MAX)
                    .saturating_mul(1000);
                let expires_at = self.obtainment_timestamp.saturating_add(lifetime_ms);
                expires_at.saturating_sub(EXPIRY_MARGIN_MS) <= now_ms
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("obtainment_timestamp", &self.obtainment_timestamp)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Callback invoked after every successful refresh.
pub type RefreshCallback = Arc<dyn Fn(&AccessToken) + Send + Sync>;

/// Source of bearer tokens for chat, API and PubSub clients.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The OAuth client id the tokens belong to.
    fn client_id(&self) -> &str;

    /// Get a valid access token, refreshing it first if needed.
    async fn access_token(&self) -> Result<String>;
}

/// Static credentials for a [`RefreshingAuthProvider`].
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl RefreshConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    /// Override the token endpoint (useful for testing).
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }
}

/// Auth provider that transparently refreshes its token.
///
/// Refreshes are serialized: concurrent callers of [`AuthProvider::access_token`]
/// wait for the one in-flight exchange instead of starting their own.
pub struct RefreshingAuthProvider {
    config: RefreshConfig,
    http: reqwest::Client,
    token: Mutex<AccessToken>,
    on_refresh: RwLock<Vec<RefreshCallback>>,
}

impl RefreshingAuthProvider {
    /// Create a provider seeded with `initial`.
    pub fn new(config: RefreshConfig, initial: AccessToken) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            token: Mutex::new(initial),
            on_refresh: RwLock::new(Vec::new()),
        }
    }

    /// Register a refresh observer.
    ///
    /// Callbacks run while the token lock is held and must not call back into
    /// this provider.
    pub fn on_refresh(&self, callback: RefreshCallback) {
        self.on_refresh.write().push(callback);
    }

    /// Snapshot of the current token.
    pub async fn current_token(&self) -> AccessToken {
        self.token.lock().await.clone()
    }

    /// Force a refresh regardless of the current token's expiry.
    pub async fn refresh(&self) -> Result<AccessToken> {
        let mut token = self.token.lock().await;
        self.refresh_locked(&mut token).await?;
        Ok(token.clone())
    }

    async fn refresh_locked(&self, token: &mut AccessToken) -> Result<()> {
        let mut form = vec![
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.clone()),
        ];
        match token.refresh_token.as_deref() {
            Some(refresh_token) => {
                debug!(client_id = %self.config.client_id, "Refreshing user access token");
                form.push(("grant_type", "refresh_token".to_string()));
                form.push(("refresh_token", refresh_token.to_string()));
            }
            None => {
                debug!(client_id = %self.config.client_id, "Requesting app access token");
                form.push(("grant_type", "client_credentials".to_string()));
            }
        }

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorResponse = response.json().await.unwrap_or_default();
            let message = body.message.as_deref().unwrap_or("unknown error");
            error!(%status, %message, "Token refresh rejected");
            return Err(TwitchError::auth(format!(
                "token endpoint returned {status}: {message}"
            )));
        }

        let body: TokenResponse = response.json().await?;
        let mut refreshed = body.into_token(Utc::now().timestamp_millis())?;
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = token.refresh_token.clone();
        }
        *token = refreshed;

        info!(
            expires_in = ?token.expires_in,
            scopes = token.scope.len(),
            "Access token refreshed"
        );

        for callback in self.on_refresh.read().iter() {
            callback(token);
        }
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for RefreshingAuthProvider {
    fn client_id(&self) -> &str {
        &self.config.client_id
    }

    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if token.is_expired_at(Utc::now().timestamp_millis()) {
            self.refresh_locked(&mut token).await?;
        }
        Ok(token.access_token.clone())
    }
}

impl std::fmt::Debug for RefreshingAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshingAuthProvider")
            .field("client_id", &self.config.client_id)
            .field("token_url", &self.config.token_url)
            .finish_non_exhaustive()
    }
}

/// Body of a successful token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<Scope>,
}

/// Granted scopes, either as a list or space separated.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Scope {
    List(Vec<String>),
    Joined(String),
}

impl Scope {
    fn into_vec(self) -> Vec<String> {
        match self {
            Scope::List(items) => items,
            Scope::Joined(s) => s.split_whitespace().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
}

impl TokenResponse {
    /// Convert into an [`AccessToken`] obtained at `now_ms`.
    pub fn into_token(self, now_ms: i64) -> Result<AccessToken> {
        if self.access_token.is_empty() {
            return Err(TwitchError::auth("missing access_token in response"));
        }
        Ok(AccessToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_in: self.expires_in,
            obtainment_timestamp: now_ms,
            scope: self.scope.map(Scope::into_vec).unwrap_or_default(),
        })
    }
}
