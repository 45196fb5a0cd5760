//! Session Lifecycle and Event Relay
//!
//! Orchestrates one protocol connection around a black-box protocol client:
//! - Chooses between resuming stored credentials and fresh QR pairing
//! - Relays inbound messages to a downstream queue, then acknowledges them
//! - Persists or clears credentials when the connection closes

pub mod auth_state;
pub mod bootstrap;
pub mod close;
pub mod dispatch;
pub mod mock;
pub mod qr;
pub mod relay;
pub mod store;
pub mod traits;

pub use auth_state::{AuthState, AuthStateError, IDENTITY_KEY};
pub use bootstrap::{BootstrapError, BootstrapState, SessionBootstrapper, SessionBranch, SessionOutcome};
pub use close::{CloseAction, CloseHandler};
pub use dispatch::{Dispatch, EventHandler, EventTable, HandlerError};
pub use mock::{CallLog, MockProtocolClient, MockPublisher, MockQrEncoder};
pub use qr::{PngQrEncoder, QrError, QrHandler};
pub use relay::{AckPolicy, InboxRelay, RelayError};
pub use store::{CredentialStore, StoreError};
pub use traits::{
    CloseReason, Connection, Event, EventKind, InboundMessage, ProtocolClient, ProtocolError,
    PublishError, Publisher, QrEncoder,
};
