//! Environment configuration.
//!
//! Supported env vars:
//! - `BROKER_TRANSPORTER_URI` (required): bus transporter endpoint
//! - `LOG_LEVEL` (default `info`)
//! - `TWITCH_CLIENT_ID`, `TWITCH_CLIENT_SECRET` (required)
//! - `TWITCH_REFRESH_TOKEN` (optional)
//! - `DATABASE_URL` (default `sqlite:bridge.db?mode=rwc`)

use url::Url;

use crate::credentials::AuthOptions;
use crate::logging::DEFAULT_LOG_LEVEL;
use crate::{Error, Result};

/// Default shared pool URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:bridge.db?mode=rwc";

/// Remote endpoints used by the platform client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitchEndpoints {
    pub token_url: String,
    pub validate_url: String,
    pub helix_url: String,
    pub chat_url: String,
}

impl Default for TwitchEndpoints {
    fn default() -> Self {
        Self {
            token_url: twitch_client::auth::TOKEN_URL.to_string(),
            validate_url: twitch_client::api::VALIDATE_URL.to_string(),
            helix_url: twitch_client::api::HELIX_URL.to_string(),
            chat_url: twitch_client::chat::TWITCH_WS_URL.to_string(),
        }
    }
}

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bus transporter endpoint; also the bus node identity.
    pub broker_uri: Url,
    pub log_level: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: Option<String>,
    pub database_url: String,
    pub endpoints: TwitchEndpoints,
}

impl BridgeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| Error::config(format!("{key} is required but not set")))
        };

        let broker = require("BROKER_TRANSPORTER_URI")?;
        let broker_uri = Url::parse(&broker)
            .map_err(|e| Error::config(format!("BROKER_TRANSPORTER_URI is not a valid URI: {e}")))?;

        Ok(Self {
            broker_uri,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            client_id: require("TWITCH_CLIENT_ID")?,
            client_secret: require("TWITCH_CLIENT_SECRET")?,
            refresh_token: get("TWITCH_REFRESH_TOKEN"),
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            endpoints: TwitchEndpoints::default(),
        })
    }

    /// Options used to create the bot identity.
    pub fn auth_options(&self) -> AuthOptions {
        AuthOptions {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }

    /// Bus node identity derived from the transporter URI.
    pub fn node_id(&self) -> String {
        self.broker_uri.to_string()
    }
}
