//! NATS publisher
//!
//! The routing key is used as the NATS subject. Each publish is flushed so a
//! broken connection surfaces as a `PublishError` on the message that hit it.

use crate::session::traits::{PublishError, Publisher};
use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;
use super::QueueSettings;
use tracing::{debug, info, warn};

/// Connection timeout for the initial broker connect
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn connect_options(settings: &QueueSettings) -> ConnectOptions {
    let mut options = ConnectOptions::new()
        .name(&settings.client_name)
        .connection_timeout(CONNECT_TIMEOUT);

    if let (Some(user), Some(pass)) = (&settings.user, &settings.password) {
        options = options.user_and_password(user.clone(), pass.clone());
    }
    options
}

/// Publisher backed by a NATS connection
#[derive(Clone)]
pub struct NatsPublisher {
    client: Client,
}

impl NatsPublisher {
    /// Connect to the broker; fails fast if it is unreachable
    pub async fn connect(settings: &QueueSettings) -> Result<Self, PublishError> {
        info!("Connecting to NATS at {}", settings.url);
        if settings.vhost.is_some() {
            warn!("NATS has no virtual hosts, ignoring vhost setting");
        }

        let client = connect_options(settings)
            .connect(&settings.url)
            .await
            .map_err(|e| PublishError::Connection(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", settings.url);
        Ok(Self { client })
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    async fn publish(&self, routing_key: &str, payload: &Value) -> Result<(), PublishError> {
        let body = Bytes::from(serde_json::to_vec(payload)?);
        debug!(subject = routing_key, bytes = body.len(), "publishing");

        self.client
            .publish(routing_key.to_string(), body)
            .await
            .map_err(|e| PublishError::Publish(e.to_string()))?;
        self.client
            .flush()
            .await
            .map_err(|e| PublishError::Publish(format!("Flush failed: {}", e)))?;

        Ok(())
    }
}
