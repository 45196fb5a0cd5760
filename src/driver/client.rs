//! Driver-backed protocol client
//!
//! Requests are correlated with responses by id through oneshot channels.
//! A router task owns the driver's output: responses complete pending requests,
//! `authState` events update the credential snapshot, all other events go to
//! the session's event stream in arrival order. If the output ends without a
//! `close` event, the router emits one so every termination reaches the
//! session's close handling.

use super::protocol::{
    decode_event, parse_protocol_error, DriverMessage, Incoming, Request, METHOD_AUTHENTICATE,
    METHOD_CONNECT, METHOD_SEND_READ_RECEIPT,
};
use super::transport::{spawn_reader, LineWriter};
use crate::session::auth_state::AuthState;
use crate::session::traits::{
    CloseReason, Connection, Event, EventStream, InboundMessage, ProtocolClient, ProtocolError,
    ProtocolResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Close description used when the driver stops without saying why
pub const DRIVER_EXITED: &str = "driver exited";

/// In-flight requests; `closed` once the driver's output has ended
#[derive(Default)]
struct Pending {
    callbacks: HashMap<u32, oneshot::Sender<ProtocolResult<Value>>>,
    closed: bool,
}

/// Driver executable and arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl DriverCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Protocol client that spawns one driver process per connection
#[derive(Debug, Clone)]
pub struct DriverClient {
    command: DriverCommand,
}

impl DriverClient {
    pub fn new(command: DriverCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ProtocolClient for DriverClient {
    type Connection = DriverConnection;

    async fn connect(
        &self,
        seed: Option<AuthState>,
    ) -> ProtocolResult<(DriverConnection, EventStream)> {
        info!(command = %self.command.command, "starting protocol driver");

        let mut child = Command::new(&self.command.command)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProtocolError::Connect(format!(
                    "failed to start driver '{}': {}",
                    self.command.command, e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProtocolError::Connect("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProtocolError::Connect("driver stdout unavailable".to_string()))?;

        let (mut connection, events) = DriverConnection::from_pipes(stdin, stdout);
        connection._child = Some(child);
        connection.open(seed).await?;

        Ok((connection, events))
    }
}

/// One driver session
pub struct DriverConnection {
    writer: tokio::sync::Mutex<LineWriter>,
    pending: Arc<Mutex<Pending>>,
    last_id: AtomicU32,
    auth_state: Arc<Mutex<AuthState>>,
    /// Held only so `kill_on_drop` stops the driver with the connection
    _child: Option<Child>,
}

impl DriverConnection {
    /// Build a connection over raw pipes and start routing driver output
    pub fn from_pipes<W, R>(writer: W, reader: R) -> (Self, EventStream)
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (messages, _reader) = spawn_reader(reader);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Mutex::new(Pending::default()));
        let auth_state = Arc::new(Mutex::new(AuthState::new()));

        tokio::spawn(route(
            messages,
            events_tx,
            Arc::clone(&pending),
            Arc::clone(&auth_state),
        ));

        let connection = Self {
            writer: tokio::sync::Mutex::new(LineWriter::new(writer)),
            pending,
            last_id: AtomicU32::new(0),
            auth_state,
            _child: None,
        };

        (connection, events_rx)
    }

    /// Seed the driver with `seed` (or nothing, for pairing)
    pub async fn open(&self, seed: Option<AuthState>) -> ProtocolResult<()> {
        let params = json!({ "authState": seed.as_ref().map(AuthState::to_json) });
        if let Some(seed) = seed {
            *self.auth_state.lock().unwrap() = seed;
        }

        self.request(METHOD_CONNECT, params)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                ProtocolError::Connect(_) => e,
                other => ProtocolError::Connect(other.to_string()),
            })
    }

    /// Send a request and await the matching response
    pub async fn request(&self, method: &str, params: Value) -> ProtocolResult<Value> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap();
            if pending.closed {
                return Err(ProtocolError::Closed);
            }
            pending.callbacks.insert(id, tx);
        }

        let request = Request {
            id,
            method: method.to_string(),
            params,
        };
        let value = serde_json::to_value(&request)
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;

        debug!(id, method, "driver request");
        if let Err(e) = self.writer.lock().await.send(&value).await {
            self.pending.lock().unwrap().callbacks.remove(&id);
            return Err(ProtocolError::Transport(format!("write to driver failed: {}", e)));
        }

        rx.await.map_err(|_| ProtocolError::Closed)?
    }
}

#[async_trait]
impl Connection for DriverConnection {
    async fn authenticate(&self) -> ProtocolResult<()> {
        let result = self
            .request(METHOD_AUTHENTICATE, json!({}))
            .await
            .map_err(|e| match e {
                ProtocolError::Rejected(reason) => ProtocolError::Authentication(reason),
                other => other,
            })?;

        if let Some(state) = result.get("authState").filter(|v| !v.is_null()) {
            let state = AuthState::from_json(state.clone())
                .map_err(|e| ProtocolError::Authentication(e.to_string()))?;
            *self.auth_state.lock().unwrap() = state;
        }
        Ok(())
    }

    async fn send_read_receipt(&self, message: &InboundMessage) -> ProtocolResult<()> {
        self.request(
            METHOD_SEND_READ_RECEIPT,
            json!({ "message": Value::Object(message.attrs().clone()) }),
        )
        .await
        .map(|_| ())
    }

    fn auth_state(&self) -> AuthState {
        self.auth_state.lock().unwrap().clone()
    }
}

async fn route(
    mut messages: mpsc::UnboundedReceiver<Value>,
    events: mpsc::UnboundedSender<Event>,
    pending: Arc<Mutex<Pending>>,
    auth_state: Arc<Mutex<AuthState>>,
) {
    let mut close_forwarded = false;

    while let Some(value) = messages.recv().await {
        let message = match serde_json::from_value::<DriverMessage>(value.clone()) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unrecognized driver message: {} ({})", value, e);
                continue;
            }
        };

        match message {
            DriverMessage::Response(response) => {
                let Some(callback) = pending.lock().unwrap().callbacks.remove(&response.id) else {
                    warn!(id = response.id, "driver response for unknown request");
                    continue;
                };
                let result = match response.error {
                    Some(error) => Err(parse_protocol_error(error)),
                    None => Ok(response.result.unwrap_or(Value::Null)),
                };
                let _ = callback.send(result);
            }
            DriverMessage::Event(event) => match decode_event(event) {
                Ok(Incoming::Event(event)) => {
                    close_forwarded |= matches!(event, Event::Close(_));
                    // Receiver gone means the session is over; keep draining responses
                    let _ = events.send(event);
                }
                Ok(Incoming::AuthState(state)) => {
                    debug!("driver updated credentials");
                    *auth_state.lock().unwrap() = state;
                }
                Err(e) => warn!("Ignoring driver event: {}", e),
            },
        }
    }

    if !close_forwarded {
        warn!("driver output ended without a close event");
        let _ = events.send(Event::Close(CloseReason::disconnected(DRIVER_EXITED)));
    }

    debug!("driver output ended, failing pending requests");
    let mut pending = pending.lock().unwrap();
    pending.closed = true;
    for (_, callback) in pending.callbacks.drain() {
        let _ = callback.send(Err(ProtocolError::Closed));
    }
}
