//! Mock Collaborators for Testing
//!
//! In-memory protocol client, publisher, and QR encoder so the whole session
//! lifecycle can be exercised without a network or a driver process.
//! A shared `CallLog` records cross-collaborator call order.

use super::auth_state::AuthState;
use super::traits::*;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Simulated handshake latency; pairing events are delivered meanwhile
const AUTH_LATENCY: Duration = Duration::from_millis(10);

/// Ordered record of collaborator calls shared between mocks
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Entries starting with `prefix`
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }
}

fn message_label(message: &InboundMessage) -> String {
    message.id().unwrap_or("?").to_string()
}

// ============================================================================
// Protocol client
// ============================================================================

#[derive(Default)]
struct ConnectionState {
    auth_state: AuthState,
    sender: Option<mpsc::UnboundedSender<Event>>,
    events: Vec<Event>,
    auth_failure: Option<String>,
    state_after_auth: Option<AuthState>,
    receipts: Vec<InboundMessage>,
}

/// Mock connection
#[derive(Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<ConnectionState>>,
    fail_receipts: Arc<AtomicBool>,
    log: CallLog,
}

impl MockConnection {
    /// Connection with no event stream; authenticates successfully
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn detached_with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Make subsequent read receipts fail
    pub fn fail_read_receipts(&self, fail: bool) {
        self.fail_receipts.store(fail, Ordering::SeqCst);
    }

    /// Messages acknowledged so far
    pub fn receipts(&self) -> Vec<InboundMessage> {
        self.state.lock().unwrap().receipts.clone()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn authenticate(&self) -> ProtocolResult<()> {
        self.log.push("authenticate");
        tokio::time::sleep(AUTH_LATENCY).await;

        let mut state = self.state.lock().unwrap();
        let result = match state.auth_failure.take() {
            Some(reason) => Err(ProtocolError::Authentication(reason)),
            None => {
                if let Some(next) = state.state_after_auth.take() {
                    state.auth_state = next;
                }
                Ok(())
            }
        };

        // Remaining events are delivered even when authentication fails so
        // tests can check that nothing handles them
        let events: Vec<Event> = state.events.drain(..).collect();
        if let Some(sender) = state.sender.take() {
            for event in events {
                let _ = sender.send(event);
            }
        }

        result
    }

    async fn send_read_receipt(&self, message: &InboundMessage) -> ProtocolResult<()> {
        self.log.push(format!("read_receipt:{}", message_label(message)));
        if self.fail_receipts.load(Ordering::SeqCst) {
            return Err(ProtocolError::Transport("receipt rejected".to_string()));
        }
        self.state.lock().unwrap().receipts.push(message.clone());
        Ok(())
    }

    fn auth_state(&self) -> AuthState {
        self.state.lock().unwrap().auth_state.clone()
    }
}

#[derive(Default)]
struct ClientState {
    pairing_events: Vec<Event>,
    events: Vec<Event>,
    auth_failure: Option<String>,
    connect_failure: Option<String>,
    state_after_auth: Option<AuthState>,
    seeds: Vec<Option<AuthState>>,
    connections: Vec<MockConnection>,
}

/// Mock protocol client
///
/// Events queued with `add_pairing_event` are delivered while `authenticate`
/// is pending; events queued with `add_event` are delivered once it resolves.
/// The event stream ends after the last queued event.
#[derive(Clone, Default)]
pub struct MockProtocolClient {
    state: Arc<Mutex<ClientState>>,
    log: CallLog,
}

impl MockProtocolClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Deliver `event` during the handshake
    pub fn add_pairing_event(&self, event: Event) {
        self.state.lock().unwrap().pairing_events.push(event);
    }

    /// Deliver `event` after the handshake
    pub fn add_event(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }

    pub fn fail_authentication(&self, reason: impl Into<String>) {
        self.state.lock().unwrap().auth_failure = Some(reason.into());
    }

    pub fn fail_connect(&self, reason: impl Into<String>) {
        self.state.lock().unwrap().connect_failure = Some(reason.into());
    }

    /// Credentials the protocol holds once authentication succeeds
    pub fn set_state_after_authentication(&self, auth_state: AuthState) {
        self.state.lock().unwrap().state_after_auth = Some(auth_state);
    }

    /// Seeds passed to each `connect` call
    pub fn connect_seeds(&self) -> Vec<Option<AuthState>> {
        self.state.lock().unwrap().seeds.clone()
    }

    pub fn connections(&self) -> Vec<MockConnection> {
        self.state.lock().unwrap().connections.clone()
    }
}

#[async_trait]
impl ProtocolClient for MockProtocolClient {
    type Connection = MockConnection;

    async fn connect(
        &self,
        seed: Option<AuthState>,
    ) -> ProtocolResult<(MockConnection, EventStream)> {
        self.log.push(if seed.is_some() {
            "connect:seeded"
        } else {
            "connect:fresh"
        });

        let mut client = self.state.lock().unwrap();
        client.seeds.push(seed.clone());
        if let Some(reason) = client.connect_failure.take() {
            return Err(ProtocolError::Connect(reason));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for event in client.pairing_events.drain(..) {
            let _ = tx.send(event);
        }

        let connection = MockConnection {
            state: Arc::new(Mutex::new(ConnectionState {
                auth_state: seed.unwrap_or_default(),
                sender: Some(tx),
                events: client.events.drain(..).collect(),
                auth_failure: client.auth_failure.take(),
                state_after_auth: client.state_after_auth.take(),
                receipts: Vec::new(),
            })),
            fail_receipts: Arc::new(AtomicBool::new(false)),
            log: self.log.clone(),
        };
        client.connections.push(connection.clone());

        Ok((connection, rx))
    }
}

// ============================================================================
// Publisher
// ============================================================================

#[derive(Default)]
struct PublisherState {
    published: Vec<(String, Value)>,
}

/// Mock queue publisher
#[derive(Clone, Default)]
pub struct MockPublisher {
    state: Arc<Mutex<PublisherState>>,
    failures_left: Arc<AtomicUsize>,
    log: CallLog,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Fail the next `count` publishes
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Successfully published (routing key, payload) pairs
    pub fn published(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().published.clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, routing_key: &str, payload: &Value) -> Result<(), PublishError> {
        let label = payload.get("id").and_then(Value::as_str).unwrap_or("?");
        self.log.push(format!("publish:{}", label));

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PublishError::Publish("broker unavailable".to_string()));
        }

        self.state
            .lock()
            .unwrap()
            .published
            .push((routing_key.to_string(), payload.clone()));
        Ok(())
    }
}

// ============================================================================
// QR encoder
// ============================================================================

/// Arguments of one `encode` call
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeCall {
    pub data: Vec<u8>,
    pub error_correction: ErrorCorrection,
    pub scale: u32,
}

/// Mock QR encoder producing `b"QR:" + data`
#[derive(Clone, Default)]
pub struct MockQrEncoder {
    calls: Arc<Mutex<Vec<EncodeCall>>>,
    fail: bool,
}

impl MockQrEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<EncodeCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Image bytes this mock produces for `data`
    pub fn image_for(data: &[u8]) -> Vec<u8> {
        [b"QR:".as_slice(), data].concat()
    }
}

impl QrEncoder for MockQrEncoder {
    fn encode(
        &self,
        data: &[u8],
        error_correction: ErrorCorrection,
        scale: u32,
    ) -> Result<Vec<u8>, EncodeError> {
        self.calls.lock().unwrap().push(EncodeCall {
            data: data.to_vec(),
            error_correction,
            scale,
        });
        if self.fail {
            return Err(EncodeError("mock encoder failure".to_string()));
        }
        Ok(Self::image_for(data))
    }
}
