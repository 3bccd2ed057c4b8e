//! Application-wide error types.

use thiserror::Error;

use crate::bus::BusError;
use crate::connectors::ConnectorError;
use crate::credentials::CredentialError;
use crate::schema::ValidationError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn unknown_action(action: impl Into<String>) -> Self {
        Self::UnknownAction(action.into())
    }
}
