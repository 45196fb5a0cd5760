//! Driver wire messages
//!
//! Request:
//! ```json
//! { "id": 3, "method": "sendReadReceipt", "params": { "message": { "id": "3EB0..." } } }
//! ```
//! Response (result or error):
//! ```json
//! { "id": 3, "result": null }
//! { "id": 3, "error": { "message": "not connected", "name": "ConnectionError" } }
//! ```
//! Event (no `id`):
//! ```json
//! { "event": "qr", "params": { "parts": ["2@Xk1...", "x1Ce...", "HkT0..."] } }
//! ```

use crate::session::auth_state::AuthState;
use crate::session::traits::{CloseReason, Event, InboundMessage, ProtocolError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const METHOD_CONNECT: &str = "connect";
pub const METHOD_AUTHENTICATE: &str = "authenticate";
pub const METHOD_SEND_READ_RECEIPT: &str = "sendReadReceipt";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u32,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    pub event: String,
    #[serde(default)]
    pub params: Value,
}

/// Responses carry `id`, events carry `event`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DriverMessage {
    Response(Response),
    Event(WireEvent),
}

/// A decoded driver event
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Dispatched to the session's handlers
    Event(Event),
    /// Replaces the connection's credential snapshot
    AuthState(AuthState),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown driver event '{0}'")]
    UnknownEvent(String),

    #[error("malformed '{event}' event: {reason}")]
    Malformed { event: String, reason: String },
}

#[derive(Deserialize)]
struct QrParams {
    parts: Vec<String>,
}

#[derive(Deserialize)]
struct InboxParams {
    message: serde_json::Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseParams {
    #[serde(default)]
    is_logged_out: bool,
    #[serde(default)]
    reason: Option<String>,
}

fn params<T: for<'de> Deserialize<'de>>(event: &WireEvent) -> Result<T, DecodeError> {
    serde_json::from_value(event.params.clone()).map_err(|e| DecodeError::Malformed {
        event: event.event.clone(),
        reason: e.to_string(),
    })
}

/// Decode a driver event into its session representation
pub fn decode_event(event: WireEvent) -> Result<Incoming, DecodeError> {
    match event.event.as_str() {
        "qr" => {
            let QrParams { parts } = params(&event)?;
            Ok(Incoming::Event(Event::Qr(
                parts.into_iter().map(String::into_bytes).collect(),
            )))
        }
        "inbox" => {
            let InboxParams { message } = params(&event)?;
            Ok(Incoming::Event(Event::Inbox(InboundMessage::new(message))))
        }
        "close" => {
            let CloseParams {
                is_logged_out,
                reason,
            } = params(&event)?;
            Ok(Incoming::Event(Event::Close(CloseReason {
                logged_out: is_logged_out,
                description: reason,
            })))
        }
        "authState" => AuthState::from_json(event.params.clone())
            .map(Incoming::AuthState)
            .map_err(|e| DecodeError::Malformed {
                event: event.event.clone(),
                reason: e.to_string(),
            }),
        other => Err(DecodeError::UnknownEvent(other.to_string())),
    }
}

/// Convert a driver error payload into a protocol error
pub fn parse_protocol_error(error: ErrorPayload) -> ProtocolError {
    match error.name.as_deref() {
        Some("AuthenticationError") => ProtocolError::Authentication(error.message),
        Some("ConnectionClosed") => ProtocolError::Closed,
        _ => ProtocolError::Rejected(error.message),
    }
}
