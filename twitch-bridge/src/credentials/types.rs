//! Core credential types.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use twitch_client::AccessToken;

/// Options used to create an identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOptions {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthOptions")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Token state of an identity as last reported by its provider.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenSnapshot {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: Option<u64>,
    /// Milliseconds since the Unix epoch.
    pub obtainment_timestamp: i64,
    pub scope: Vec<String>,
}

impl TokenSnapshot {
    /// Whether a token has been obtained yet.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty()
    }

    /// When the token expires, if known.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let millis = i64::try_from(self.expires_in?)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        Utc.timestamp_millis_opt(self.obtainment_timestamp.saturating_add(millis))
            .single()
    }
}

impl From<&AccessToken> for TokenSnapshot {
    fn from(token: &AccessToken) -> Self {
        Self {
            access_token: token.access_token.clone(),
            expires_in: token.expires_in,
            obtainment_timestamp: token.obtainment_timestamp,
            scope: token.scope.clone(),
        }
    }
}

impl std::fmt::Debug for TokenSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSnapshot")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("obtainment_timestamp", &self.obtainment_timestamp)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_options_wire_names() {
        let options = AuthOptions {
            client_id: "id".to_string(),
            client_secret: "hunter2".to_string(),
            refresh_token: None,
        };
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value, serde_json::json!({ "clientId": "id", "clientSecret": "hunter2" }));
        assert!(!format!("{:?}", options).contains("hunter2"));
    }

    #[test]
    fn test_snapshot_from_token() {
        let token = AccessToken {
            access_token: "abc".to_string(),
            refresh_token: Some("r".to_string()),
            expires_in: Some(10),
            obtainment_timestamp: 1_000,
            scope: vec!["chat:read".to_string()],
        };
        let snapshot = TokenSnapshot::from(&token);
        assert_eq!(snapshot.access_token, "abc");
        assert_eq!(snapshot.expires_at().unwrap().timestamp_millis(), 11_000);
        assert!(!format!("{:?}", snapshot).contains("abc"));
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = TokenSnapshot::default();
        assert!(snapshot.is_empty());
        assert!(snapshot.expires_at().is_none());
    }

    #[test]
    fn test_expiry_beyond_range_is_none() {
        let snapshot = TokenSnapshot {
            access_token: "abc".to_string(),
            expires_in: Some(u64::MAX),
            obtainment_timestamp: 1_000,
            scope: vec![],
        };
        assert!(snapshot.expires_at().is_none());
    }
}
