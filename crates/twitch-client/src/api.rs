//! Helix and OAuth introspection endpoints.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::AuthProvider;
use crate::error::{Result, TwitchError};

/// Helix REST base URL.
pub const HELIX_URL: &str = "https://api.twitch.tv/helix";

/// OAuth token introspection endpoint.
pub const VALIDATE_URL: &str = "https://id.twitch.tv/oauth2/validate";

/// Maximum number of logins accepted by a single `/users` request.
const MAX_USERS_PER_REQUEST: usize = 100;

/// Token introspection result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub client_id: String,
    /// Absent for app access tokens.
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Remaining lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
}

/// A Helix user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelixUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default, rename = "type")]
    pub user_type: String,
    #[serde(default)]
    pub broadcaster_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub profile_image_url: String,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Deserialize)]
struct HelixResponse<T> {
    data: Vec<T>,
}

/// Validate `token` against the introspection endpoint at `url`.
pub async fn validate_access_token(
    http: &reqwest::Client,
    url: &str,
    token: &str,
) -> Result<TokenInfo> {
    let response = http
        .get(url)
        .header("Authorization", format!("OAuth {token}"))
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(TwitchError::auth("access token is invalid or expired"));
    }
    if !status.is_success() {
        return Err(TwitchError::protocol(format!(
            "token validation returned {status}"
        )));
    }

    let info: TokenInfo = response.json().await?;
    debug!(
        login = ?info.login,
        scopes = info.scopes.len(),
        expires_in = info.expires_in,
        "Token validated"
    );
    Ok(info)
}

/// Authenticated client for the Twitch REST API.
pub struct ApiClient {
    auth: Arc<dyn AuthProvider>,
    http: reqwest::Client,
    helix_url: String,
    validate_url: String,
}

impl ApiClient {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            auth,
            http: reqwest::Client::new(),
            helix_url: HELIX_URL.to_string(),
            validate_url: VALIDATE_URL.to_string(),
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

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    /// Introspect the provider's current token.
    pub async fn validate_token(&self) -> Result<TokenInfo> {
        let token = self.auth.access_token().await?;
        validate_access_token(&self.http, &self.validate_url, &token).await
    }

    /// Look up users by login name. Unknown logins are omitted from the result.
    pub async fn get_users_by_logins(&self, logins: &[&str]) -> Result<Vec<HelixUser>> {
        let mut users = Vec::with_capacity(logins.len());
        for chunk in logins.chunks(MAX_USERS_PER_REQUEST) {
            let query: Vec<(&str, &str)> = chunk.iter().map(|login| ("login", *login)).collect();
            let token = self.auth.access_token().await?;
            let response = self
                .http
                .get(format!("{}/users", self.helix_url))
                .header("Client-Id", self.auth.client_id())
                .bearer_auth(token)
                .query(&query)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                warn!(%status, "Helix users request failed");
                return Err(TwitchError::protocol(format!(
                    "helix /users returned {status}"
                )));
            }
            let page: HelixResponse<HelixUser> = response.json().await?;
            users.extend(page.data);
        }
        Ok(users)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("client_id", &self.auth.client_id())
            .field("helix_url", &self.helix_url)
            .finish_non_exhaustive()
    }
}
