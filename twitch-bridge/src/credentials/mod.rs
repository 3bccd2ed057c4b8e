//! Named OAuth identities.
//!
//! The [`CredentialStore`] keeps one refreshing provider per identity id and
//! announces refreshes on the event bus. [`AuthService`] creates the bot
//! identity at startup.

mod error;
mod service;
mod store;
mod types;

pub use error::CredentialError;
pub use service::{AuthService, BOT_IDENTITY};
pub use store::{CredentialHandle, CredentialStore, Identity};
pub use types::{AuthOptions, TokenSnapshot};
