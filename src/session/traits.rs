//! Collaborator Trait Abstractions
//!
//! The protocol client, the QR encoder, and the queue publisher are external
//! collaborators. These traits are the seams the session core is written
//! against; `mock` provides in-memory implementations for tests.

use super::auth_state::AuthState;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// Inbound message payload
///
/// Opaque attribute mapping identifying sender, content, and the metadata the
/// protocol needs to acknowledge it. Lives only for one relay operation.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    attrs: Map<String, Value>,
}

impl InboundMessage {
    pub fn new(attrs: Map<String, Value>) -> Self {
        Self { attrs }
    }

    /// Canonical payload forwarded to the downstream queue
    pub fn attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }

    /// Message id, if the protocol supplied one
    pub fn id(&self) -> Option<&str> {
        self.attrs.get("id").and_then(Value::as_str)
    }
}

/// Why a connection terminated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReason {
    /// The account was logged out remotely; stored credentials are void
    pub logged_out: bool,
    pub description: Option<String>,
}

impl CloseReason {
    pub fn logged_out() -> Self {
        Self {
            logged_out: true,
            description: None,
        }
    }

    pub fn disconnected(description: impl Into<String>) -> Self {
        Self {
            logged_out: false,
            description: Some(description.into()),
        }
    }
}

/// Closed set of event kinds a connection emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Qr,
    Inbox,
    Close,
}

/// Connection event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Pairing code parts (superseded by any later `Qr`)
    Qr(Vec<Vec<u8>>),
    Inbox(InboundMessage),
    Close(CloseReason),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Qr(_) => EventKind::Qr,
            Event::Inbox(_) => EventKind::Inbox,
            Event::Close(_) => EventKind::Close,
        }
    }
}

/// Events in delivery order. Ends when the connection is gone.
pub type EventStream = mpsc::UnboundedReceiver<Event>;

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Protocol client errors
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Connection closed")]
    Closed,
}

/// One live protocol connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Complete the handshake (QR pairing or credential resume)
    async fn authenticate(&self) -> ProtocolResult<()>;

    /// Acknowledge `message` as read to the remote service
    async fn send_read_receipt(&self, message: &InboundMessage) -> ProtocolResult<()>;

    /// Snapshot of the credentials as the protocol client currently holds them
    fn auth_state(&self) -> AuthState;
}

/// Protocol client facade
///
/// `connect` receives the seed chosen at factory time: restored credentials,
/// or `None` for an unauthenticated connection.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    type Connection: Connection;

    async fn connect(
        &self,
        seed: Option<AuthState>,
    ) -> ProtocolResult<(Self::Connection, EventStream)>;
}

/// QR error-correction level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCorrection {
    Low,
    Medium,
    Quartile,
    High,
}

/// QR image encoder
pub trait QrEncoder: Send + Sync {
    /// Encode `data` into image bytes, `scale` pixels per module
    fn encode(
        &self,
        data: &[u8],
        error_correction: ErrorCorrection,
        scale: u32,
    ) -> Result<Vec<u8>, EncodeError>;
}

#[derive(Debug, thiserror::Error)]
#[error("QR encode failed: {0}")]
pub struct EncodeError(pub String);

/// Downstream queue errors
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Queue connection error: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Downstream queue publisher
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, routing_key: &str, payload: &Value) -> Result<(), PublishError>;
}
