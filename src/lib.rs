//! Session Relay - session lifecycle manager and inbox relay
//!
//! Drives one connection to a multi-device messaging service through an
//! external protocol client and forwards everything that arrives to a queue.
//!
//! Key behaviors:
//! - Stored credentials are resumed; without them a pairing QR code is rendered
//! - Inbound messages are published downstream, then acknowledged
//! - Credentials are saved on close, or cleared on logout
//!
//! Modules:
//! - `session`: lifecycle core and collaborator traits
//! - `driver`: protocol client speaking JSON lines to a driver process
//! - `queue`: AMQP and NATS publishers

pub mod driver;
pub mod queue;
pub mod session;
