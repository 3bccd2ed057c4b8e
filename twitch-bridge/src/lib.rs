//! twitch-bridge library crate.
//!
//! Bridges Twitch chat, API and PubSub into a versioned in-process event bus.

pub mod bus;
pub mod config;
pub mod connectors;
pub mod credentials;
pub mod database;
pub mod error;
pub mod logging;
pub mod schema;
pub mod services;

pub use error::{Error, Result};
