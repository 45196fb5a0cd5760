//! AMQP publisher
//!
//! Publishes JSON to the default exchange with the routing key, so the
//! message lands in the queue of that name. One connection and channel are
//! opened at startup and reused for every message.

use crate::session::traits::{PublishError, Publisher};
use async_trait::async_trait;
use lapin::options::BasicPublishOptions;
use lapin::uri::AMQPUri;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use serde_json::Value;
use super::QueueSettings;
use tracing::{debug, info};

/// The nameless direct exchange every queue is bound to
const DEFAULT_EXCHANGE: &str = "";

const CONTENT_TYPE_JSON: &str = "application/json";

/// Build the broker URI, applying credential and vhost overrides
pub fn amqp_uri(settings: &QueueSettings) -> Result<AMQPUri, PublishError> {
    let mut uri: AMQPUri = settings
        .url
        .parse()
        .map_err(|e| PublishError::Connection(format!("Invalid AMQP URL '{}': {}", settings.url, e)))?;

    if let (Some(user), Some(pass)) = (&settings.user, &settings.password) {
        uri.authority.userinfo.username = user.clone();
        uri.authority.userinfo.password = pass.clone();
    }
    if let Some(vhost) = &settings.vhost {
        uri.vhost = vhost.clone();
    }
    Ok(uri)
}

/// Publisher backed by an AMQP channel
pub struct AmqpPublisher {
    // Dropping the connection closes the channel
    _connection: Connection,
    channel: Channel,
}

impl AmqpPublisher {
    /// Connect to the broker; fails fast if it is unreachable
    pub async fn connect(settings: &QueueSettings) -> Result<Self, PublishError> {
        let uri = amqp_uri(settings)?;
        info!(
            host = %uri.authority.host,
            port = uri.authority.port,
            vhost = %uri.vhost,
            "Connecting to AMQP broker"
        );

        let properties = ConnectionProperties::default()
            .with_connection_name(settings.client_name.clone().into())
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);

        let connection = Connection::connect_uri(uri, properties)
            .await
            .map_err(|e| PublishError::Connection(format!("Failed to connect: {}", e)))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| PublishError::Connection(format!("Failed to open channel: {}", e)))?;

        info!("Connected to AMQP broker");
        Ok(Self {
            _connection: connection,
            channel,
        })
    }
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn publish(&self, routing_key: &str, payload: &Value) -> Result<(), PublishError> {
        let body = serde_json::to_vec(payload)?;
        debug!(routing_key, bytes = body.len(), "publishing");

        self.channel
            .basic_publish(
                DEFAULT_EXCHANGE,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_content_type(CONTENT_TYPE_JSON.into()),
            )
            .await
            .map_err(|e| PublishError::Publish(e.to_string()))?
            .await
            .map_err(|e| PublishError::Publish(format!("Broker did not accept message: {}", e)))?;

        Ok(())
    }
}
