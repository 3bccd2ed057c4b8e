//! Versioned in-process event bus.
//!
//! Topics look like `v1.chat.message`: a version, a domain and an event name.
//! Every payload is checked against the schema registered for `domain.event`
//! before it is broadcast.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::schema::{SchemaRegistry, ValidationError};

/// Current topic version.
pub const VERSION: u32 = 1;

/// Default channel capacity for bus events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Errors raised by [`EventBus::publish`].
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Unsupported version for topic {topic}")]
    UnsupportedVersion { topic: String },

    #[error("No schema registered for topic {topic}")]
    UnknownSchema { topic: String },

    #[error("Invalid payload for topic {topic}: {source}")]
    InvalidPayload {
        topic: String,
        #[source]
        source: ValidationError,
    },
}

/// A versioned topic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub version: u32,
    pub domain: String,
    pub event: String,
}

impl Topic {
    /// Topic in the current version.
    pub fn new(domain: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            version: VERSION,
            domain: domain.into(),
            event: event.into(),
        }
    }

    pub fn chat(event: impl Into<String>) -> Self {
        Self::new("chat", event)
    }

    pub fn auth(event: impl Into<String>) -> Self {
        Self::new("auth", event)
    }

    /// Parse `v<version>.<domain>.<event>`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '.');
        let version = parts.next()?.strip_prefix('v')?.parse().ok()?;
        let domain = parts.next().filter(|d| !d.is_empty())?;
        let event = parts.next().filter(|e| !e.is_empty())?;
        Some(Self {
            version,
            domain: domain.to_string(),
            event: event.to_string(),
        })
    }

    /// Name of the payload schema for this topic (`chat.message`).
    pub fn schema_name(&self) -> String {
        format!("{}.{}", self.domain, self.event)
    }

    /// Whether this topic matches `pattern`: an exact topic or a prefix ending in `.*`.
    pub fn matches(&self, pattern: &str) -> bool {
        let topic = self.to_string();
        match pattern.strip_suffix('*') {
            Some(prefix) => topic.starts_with(prefix),
            None => topic == pattern,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.version, self.domain, self.event)
    }
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub topic: Topic,
    pub payload: Value,
    /// Identity of the publishing bus node.
    pub node_id: String,
    pub emitted_at: DateTime<Utc>,
}

/// Broadcaster for bus events.
///
/// Uses tokio's broadcast channel to distribute events to multiple subscribers.
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
    schemas: Arc<SchemaRegistry>,
    node_id: String,
}

impl EventBus {
    pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
        Self::with_capacity(schemas, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(schemas: Arc<SchemaRegistry>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            schemas,
            node_id: "local".to_string(),
        }
    }

    /// Set the node identity stamped on every envelope.
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    /// Subscribe to every topic.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_to("*")
    }

    /// Subscribe to topics matching `pattern` (`v1.chat.message`, `v1.chat.*`).
    pub fn subscribe_to(&self, pattern: impl Into<String>) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            pattern: pattern.into(),
        }
    }

    /// Validate and publish `payload` on `topic`.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, topic: Topic, payload: Value) -> Result<usize, BusError> {
        if topic.version != VERSION {
            error!(%topic, "Refusing to publish on an unsupported topic version");
            return Err(BusError::UnsupportedVersion {
                topic: topic.to_string(),
            });
        }

        let schema_name = topic.schema_name();
        let Some(schema) = self.schemas.get(&schema_name) else {
            error!(%topic, "Refusing to publish on a topic without schema");
            return Err(BusError::UnknownSchema {
                topic: topic.to_string(),
            });
        };

        if let Err(source) = schema.validate(&schema_name, &payload) {
            error!(%topic, error = %source, "Refusing to publish invalid payload");
            return Err(BusError::InvalidPayload {
                topic: topic.to_string(),
                source,
            });
        }

        debug!(%topic, "Publishing bus event");
        let envelope = Envelope {
            topic,
            payload,
            node_id: self.node_id.clone(),
            emitted_at: Utc::now(),
        };
        // send() returns Err if there are no receivers, which is fine
        Ok(self.sender.send(envelope).unwrap_or(0))
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A filtered view of the bus.
pub struct Subscription {
    receiver: broadcast::Receiver<Envelope>,
    pattern: String,
}

impl Subscription {
    /// Next matching envelope, or `None` once the bus is gone.
    ///
    /// Lagging subscribers skip the missed events and keep receiving.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.topic.matches(&self.pattern) => return Some(envelope),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(pattern = %self.pattern, skipped, "Bus subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching envelope if one is already queued.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) if envelope.topic.matches(&self.pattern) => return Some(envelope),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}
