//! Downstream Queue Publishers
//!
//! - `amqp`: RabbitMQ-compatible brokers, default exchange, routing key as queue name
//! - `nats`: NATS, routing key as subject

pub mod amqp;
pub mod nats;

pub use amqp::AmqpPublisher;
pub use nats::NatsPublisher;

use crate::session::traits::{PublishError, Publisher};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Queue protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueTransport {
    #[default]
    Amqp,
    Nats,
}

/// Queue connection parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Broker URL (e.g. `amqp://127.0.0.1:5672/%2f`, `nats://127.0.0.1:4222`)
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// AMQP virtual host; overrides the one in `url`
    pub vhost: Option<String>,
    /// Client name shown in broker monitoring
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

fn default_client_name() -> String {
    "session-relay".to_string()
}

impl QueueSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: None,
            password: None,
            vhost: None,
            client_name: default_client_name(),
        }
    }
}

/// Connect the publisher for `transport`; fails fast if the broker is unreachable
pub async fn connect(
    transport: QueueTransport,
    settings: &QueueSettings,
) -> Result<Arc<dyn Publisher>, PublishError> {
    Ok(match transport {
        QueueTransport::Amqp => Arc::new(AmqpPublisher::connect(settings).await?),
        QueueTransport::Nats => Arc::new(NatsPublisher::connect(settings).await?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings: QueueSettings = toml::from_str(r#"url = "amqp://localhost""#).unwrap();
        assert_eq!(settings.url, "amqp://localhost");
        assert_eq!(settings.client_name, "session-relay");
        assert!(settings.user.is_none());
        assert!(settings.vhost.is_none());
    }

    #[test]
    fn test_transport_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            transport: QueueTransport,
        }
        let parsed: Wrapper = toml::from_str(r#"transport = "nats""#).unwrap();
        assert_eq!(parsed.transport, QueueTransport::Nats);
        assert_eq!(QueueTransport::default(), QueueTransport::Amqp);
        assert!(toml::from_str::<Wrapper>(r#"transport = "kafka""#).is_err());
    }

    #[tokio::test]
    async fn test_connect_dispatches_on_transport() {
        // Port 1 on localhost refuses connections
        for (transport, url) in [
            (QueueTransport::Amqp, "amqp://127.0.0.1:1/%2f"),
            (QueueTransport::Nats, "nats://127.0.0.1:1"),
        ] {
            let result = connect(transport, &QueueSettings::new(url)).await;
            assert!(matches!(result, Err(PublishError::Connection(_))));
        }
    }
}
