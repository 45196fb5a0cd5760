//! Session Bootstrap and Lifecycle
//!
//! Drives one connection from credential load to close:
//!
//! ```text
//! Idle ─┬─ stored credentials ──> Resume ─┐
//!       └─ no credentials ──────> Fresh ──┴─ authenticate() ─┬─> Authenticated ──> Closed
//!                                                            └─> Failed
//! ```
//!
//! - QR handling is wired before `authenticate()` and only when no identity is
//!   bound; a resumed, identified session never shows a pairing code
//! - Inbox and close handlers are wired only after authentication succeeds
//! - No retry: a failed handshake abandons the connection

use super::auth_state::AuthState;
use super::close::CloseHandler;
use super::dispatch::{Dispatch, EventTable};
use super::qr::QrHandler;
use super::relay::InboxRelay;
use super::store::{CredentialStore, StoreError};
use super::traits::{
    CloseReason, Connection, Event, EventKind, EventStream, ProtocolClient, ProtocolError,
    ProtocolResult,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapState {
    #[default]
    Idle,
    /// Seeded with restored credentials, handshake pending
    Resume,
    /// Unauthenticated, handshake (pairing) pending
    Fresh,
    Authenticated,
    /// Handshake rejected; connection abandoned
    Failed,
    Closed,
}

/// Which branch a start took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBranch {
    Resume,
    Fresh,
}

/// How a lifecycle run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The connection closed and credentials were finalized
    Closed { logged_out: bool },
    /// `authenticate()` rejected; nothing persisted
    AuthenticationFailed { reason: String },
    /// The event stream ended without a close event; nothing persisted
    Disconnected,
}

/// Errors that abort bootstrap
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("stored session is corrupt, refusing to start: {0}")]
    CorruptState(#[source] StoreError),

    #[error("failed to load stored session: {0}")]
    Store(#[source] StoreError),

    #[error(transparent)]
    Connect(ProtocolError),
}

/// Session lifecycle orchestrator
pub struct SessionBootstrapper<P: ProtocolClient> {
    client: P,
    store: CredentialStore,
    qr_handler: Arc<QrHandler>,
    relay: InboxRelay,
    state: BootstrapState,
    branch: Option<SessionBranch>,
}

impl<P: ProtocolClient> SessionBootstrapper<P> {
    pub fn new(client: P, store: CredentialStore, qr_handler: QrHandler, relay: InboxRelay) -> Self {
        Self {
            client,
            store,
            qr_handler: Arc::new(qr_handler),
            relay,
            state: BootstrapState::Idle,
            branch: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// Branch taken by the last run
    pub fn branch(&self) -> Option<SessionBranch> {
        self.branch
    }

    fn transition(&mut self, next: BootstrapState) {
        debug!(from = ?self.state, to = ?next, "session state transition");
        self.state = next;
    }

    /// Run one connection to completion
    ///
    /// Only a corrupt or unreadable credential file and a failed connect are
    /// errors; everything after the connection exists ends in an outcome.
    pub async fn run(&mut self) -> Result<SessionOutcome, BootstrapError> {
        let seed = self.store.load().map_err(|e| {
            if e.is_corrupt() {
                BootstrapError::CorruptState(e)
            } else {
                BootstrapError::Store(e)
            }
        })?;

        let (branch, next) = match &seed {
            Some(_) => (SessionBranch::Resume, BootstrapState::Resume),
            None => (SessionBranch::Fresh, BootstrapState::Fresh),
        };
        let needs_pairing = !seed.as_ref().is_some_and(AuthState::is_identified);
        self.branch = Some(branch);
        info!(?branch, needs_pairing, "starting session");

        let (connection, mut events) = self
            .client
            .connect(seed)
            .await
            .map_err(BootstrapError::Connect)?;
        self.transition(next);

        let mut table = EventTable::new();
        if needs_pairing {
            table.on(EventKind::Qr, Arc::clone(&self.qr_handler));
        }

        if let Err(e) = authenticate(&connection, &mut events, &mut table).await {
            error!("Authentication failed, abandoning connection: {}", e);
            self.transition(BootstrapState::Failed);
            return Ok(SessionOutcome::AuthenticationFailed {
                reason: e.to_string(),
            });
        }

        self.transition(BootstrapState::Authenticated);
        info!(
            identified = connection.auth_state().is_identified(),
            "session authenticated"
        );
        table.on(EventKind::Inbox, self.relay.clone());
        table.on(EventKind::Close, CloseHandler::new(self.store.clone()));

        while let Some(event) = events.recv().await {
            let close = match &event {
                Event::Close(reason) => Some(reason.clone()),
                _ => None,
            };

            let dispatch = table.dispatch(&connection, event).await;

            if let Some(CloseReason { logged_out, .. }) = close {
                info!(logged_out, handled = dispatch == Dispatch::Handled, "session closed");
                self.transition(BootstrapState::Closed);
                return Ok(SessionOutcome::Closed { logged_out });
            }
        }

        warn!("Event stream ended without a close event, credentials not saved");
        self.transition(BootstrapState::Closed);
        Ok(SessionOutcome::Disconnected)
    }
}

/// Await `authenticate()` while dispatching events that arrive meanwhile
///
/// The handshake result is polled first so events queued behind a completed
/// handshake wait for the post-authentication handlers.
async fn authenticate<C: Connection>(
    connection: &C,
    events: &mut EventStream,
    table: &mut EventTable<C>,
) -> ProtocolResult<()> {
    let handshake = connection.authenticate();
    tokio::pin!(handshake);
    let mut stream_open = true;

    loop {
        tokio::select! {
            biased;
            result = &mut handshake => return result,
            event = events.recv(), if stream_open => match event {
                Some(event) => {
                    table.dispatch(connection, event).await;
                }
                None => stream_open = false,
            },
        }
    }
}
