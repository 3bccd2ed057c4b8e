//! Lifecycle of the bot identity.

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::{CredentialHandle, CredentialStore};
use super::types::AuthOptions;
use crate::bus::{EventBus, Topic};

/// Identity shared by every connector.
pub const BOT_IDENTITY: &str = "bot";

/// Creates the bot identity on start and traces auth notifications.
pub struct AuthService {
    store: Arc<CredentialStore>,
    bus: Arc<EventBus>,
    options: AuthOptions,
    cancellation_token: CancellationToken,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl AuthService {
    pub fn new(store: Arc<CredentialStore>, bus: Arc<EventBus>, options: AuthOptions) -> Self {
        Self {
            store,
            bus,
            options,
            cancellation_token: CancellationToken::new(),
            task: parking_lot::Mutex::new(None),
        }
    }

    /// Ensure the bot identity exists and announce it.
    pub async fn start(&self) -> crate::Result<CredentialHandle> {
        self.spawn_listener();

        let handle = self
            .store
            .get_or_create(BOT_IDENTITY, Some(self.options.clone()))?;
        self.bus
            .publish(Topic::auth("created"), json!({ "instance": handle.id() }))?;

        info!(id = handle.id(), "Auth service started");
        Ok(handle)
    }

    fn spawn_listener(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let mut subscription = self.bus.subscribe_to("v1.auth.*");
        let token = self.cancellation_token.clone();
        *task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    envelope = subscription.recv() => {
                        let Some(envelope) = envelope else {
                            warn!("Event bus closed, auth listener exiting");
                            break;
                        };
                        let instance = envelope.payload["instance"].as_str().unwrap_or_default();
                        debug!(topic = %envelope.topic, instance, "Auth notification");
                    }
                }
            }
        }));
    }

    /// Stop the notification listener. Safe to call more than once.
    pub async fn stop(&self) {
        self.cancellation_token.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Auth listener task failed");
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }
}
