//! Inbox Relay
//!
//! Forwards each inbound message's attributes to the downstream queue, then
//! acknowledges it to the remote service with a read receipt.
//!
//! - Publish is attempted once; failures are reported, never buffered or retried
//! - The read receipt is only sent after the publish call has returned
//! - Messages are relayed one at a time in arrival order (the event loop awaits
//!   each relay before taking the next event)

use super::dispatch::{EventHandler, HandlerError};
use super::traits::{
    Connection, Event, EventKind, InboundMessage, ProtocolError, PublishError, Publisher,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// When to acknowledge a message relative to its publish outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AckPolicy {
    /// Acknowledge once publish returns, whatever the outcome
    #[default]
    Always,
    /// Acknowledge only messages that were published
    AfterPublish,
}

/// Relay failures for a single message
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("publish failed: {0}")]
    Publish(#[source] PublishError),

    #[error("read receipt failed: {0}")]
    Ack(#[source] ProtocolError),

    #[error("publish failed: {publish}; read receipt failed: {ack}")]
    PublishAndAck {
        publish: PublishError,
        ack: ProtocolError,
    },
}

/// Per-message relay result
#[derive(Debug)]
pub struct RelayReport {
    pub published: Result<(), PublishError>,
    /// `None` when the policy skipped the read receipt
    pub acknowledged: Option<Result<(), ProtocolError>>,
}

impl RelayReport {
    pub fn into_result(self) -> Result<(), RelayError> {
        match (self.published, self.acknowledged) {
            (Ok(()), None | Some(Ok(()))) => Ok(()),
            (Err(publish), None | Some(Ok(()))) => Err(RelayError::Publish(publish)),
            (Ok(()), Some(Err(ack))) => Err(RelayError::Ack(ack)),
            (Err(publish), Some(Err(ack))) => Err(RelayError::PublishAndAck { publish, ack }),
        }
    }
}

/// Relays inbound messages to the queue
#[derive(Clone)]
pub struct InboxRelay {
    publisher: Arc<dyn Publisher>,
    routing_key: String,
    ack_policy: AckPolicy,
}

impl InboxRelay {
    pub fn new(publisher: Arc<dyn Publisher>, routing_key: impl Into<String>) -> Self {
        Self {
            publisher,
            routing_key: routing_key.into(),
            ack_policy: AckPolicy::default(),
        }
    }

    pub fn with_ack_policy(mut self, ack_policy: AckPolicy) -> Self {
        self.ack_policy = ack_policy;
        self
    }

    /// Publish `message`, then acknowledge it per the policy
    pub async fn relay<C: Connection>(
        &self,
        connection: &C,
        message: &InboundMessage,
    ) -> RelayReport {
        let payload = Value::Object(message.attrs().clone());
        debug!(id = ?message.id(), "relaying inbound message");

        let published = self.publisher.publish(&self.routing_key, &payload).await;
        if published.is_ok() {
            info!(id = ?message.id(), routing_key = %self.routing_key, "message published");
        }

        let send_receipt = match self.ack_policy {
            AckPolicy::Always => true,
            AckPolicy::AfterPublish => published.is_ok(),
        };

        let acknowledged = if send_receipt {
            Some(connection.send_read_receipt(message).await)
        } else {
            debug!(id = ?message.id(), "publish failed, withholding read receipt");
            None
        };

        RelayReport {
            published,
            acknowledged,
        }
    }
}

#[async_trait]
impl<C: Connection> EventHandler<C> for InboxRelay {
    async fn handle(&mut self, connection: &C, event: Event) -> Result<(), HandlerError> {
        match event {
            Event::Inbox(message) => {
                self.relay(connection, &message).await.into_result()?;
                Ok(())
            }
            other => Err(HandlerError::UnexpectedEvent {
                expected: EventKind::Inbox,
                received: other.kind(),
            }),
        }
    }
}
