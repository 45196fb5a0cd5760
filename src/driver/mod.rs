//! Protocol Driver Client
//!
//! Concrete protocol client that delegates the messaging protocol to an
//! external driver process and talks newline-delimited JSON over its
//! stdin/stdout: requests carry an `id`, responses echo it, events carry an
//! `event` name instead.

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::{DriverClient, DriverCommand, DriverConnection};
