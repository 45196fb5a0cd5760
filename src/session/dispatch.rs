//! Typed Event Dispatch Table
//!
//! One handler per `EventKind`, invoked in delivery order. Handler failures
//! stop at this boundary: they are logged and the event loop keeps running.

use super::qr::QrError;
use super::relay::RelayError;
use super::store::StoreError;
use super::traits::{Connection, Event, EventKind};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, error};

/// Errors surfaced by event handlers
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Qr(#[from] QrError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("handler registered for {expected:?} received a {received:?} event")]
    UnexpectedEvent {
        expected: EventKind,
        received: EventKind,
    },
}

/// Reaction to one kind of connection event
#[async_trait]
pub trait EventHandler<C: Connection>: Send {
    async fn handle(&mut self, connection: &C, event: Event) -> Result<(), HandlerError>;
}

/// What happened to a dispatched event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// The handler ran and failed; the failure was logged
    Failed,
    /// No handler registered for this kind
    Unhandled,
}

/// Per-connection mapping from event kind to its handler
pub struct EventTable<C: Connection> {
    handlers: HashMap<EventKind, Box<dyn EventHandler<C>>>,
}

impl<C: Connection> Default for EventTable<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<C: Connection> EventTable<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any previous one
    pub fn on<H>(&mut self, kind: EventKind, handler: H)
    where
        H: EventHandler<C> + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Run the handler for `event`, if any
    pub async fn dispatch(&mut self, connection: &C, event: Event) -> Dispatch {
        let kind = event.kind();
        let Some(handler) = self.handlers.get_mut(&kind) else {
            debug!(?kind, "no handler registered, dropping event");
            return Dispatch::Unhandled;
        };

        match handler.handle(connection, event).await {
            Ok(()) => Dispatch::Handled,
            Err(e) => {
                error!(?kind, error = %e, "event handler failed");
                Dispatch::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::MockConnection;
    use crate::session::traits::CloseReason;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        seen: Arc<Mutex<Vec<EventKind>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler<MockConnection> for Recorder {
        async fn handle(
            &mut self,
            _connection: &MockConnection,
            event: Event,
        ) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(event.kind());
            if self.fail {
                return Err(HandlerError::UnexpectedEvent {
                    expected: EventKind::Close,
                    received: event.kind(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_unhandled() {
        let connection = MockConnection::detached();
        let mut table = EventTable::new();

        let outcome = table
            .dispatch(&connection, Event::Close(CloseReason::logged_out()))
            .await;
        assert_eq!(outcome, Dispatch::Unhandled);
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_kind() {
        let connection = MockConnection::detached();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut table = EventTable::new();
        table.on(
            EventKind::Qr,
            Recorder {
                seen: seen.clone(),
                fail: false,
            },
        );

        assert!(table.is_registered(EventKind::Qr));
        assert!(!table.is_registered(EventKind::Inbox));

        let handled = table
            .dispatch(&connection, Event::Qr(vec![b"ref".to_vec()]))
            .await;
        let dropped = table
            .dispatch(&connection, Event::Close(CloseReason::logged_out()))
            .await;

        assert_eq!(handled, Dispatch::Handled);
        assert_eq!(dropped, Dispatch::Unhandled);
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::Qr]);
    }

    #[tokio::test]
    async fn test_handler_failure_is_contained() {
        let connection = MockConnection::detached();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut table = EventTable::new();
        table.on(
            EventKind::Qr,
            Recorder {
                seen: seen.clone(),
                fail: true,
            },
        );

        let first = table.dispatch(&connection, Event::Qr(vec![])).await;
        let second = table.dispatch(&connection, Event::Qr(vec![])).await;

        assert_eq!(first, Dispatch::Failed);
        assert_eq!(second, Dispatch::Failed);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
