//! Credential error types.

use thiserror::Error;
use twitch_client::TwitchError;

use crate::schema::ValidationError;

/// Errors that can occur during credential operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The identity does not exist and no options were given to create it.
    #[error("No credentials for '{id}' and no options to create them")]
    MissingCredentials { id: String },

    /// Creation options failed validation.
    #[error("Invalid credential options: {0}")]
    InvalidOptions(#[from] ValidationError),

    /// The auth provider failed (token refresh, network).
    #[error("Auth provider error: {0}")]
    Provider(#[from] TwitchError),
}

impl CredentialError {
    pub fn missing(id: impl Into<String>) -> Self {
        Self::MissingCredentials { id: id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_message() {
        assert_eq!(
            CredentialError::missing("bot").to_string(),
            "No credentials for 'bot' and no options to create them"
        );
    }
}
