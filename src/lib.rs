//! Lightweight async WebSocket endpoints for the Tokio stack.
//!
//! This library implements the hard parts of the
//! [WebSocket Protocol RFC](https://datatracker.ietf.org/doc/html/rfc6455)
//! behind a small callback-driven surface: bit-exact frame encoding and
//! decoding, the role asymmetries around masking, the opening HTTP
//! handshake on both sides, per-connection read/write deadlines and the
//! close-initiation protocol, with optional TLS via rustls.
//!
//! An endpoint ([`Listener`] for accepted connections, [`Client`] for an
//! initiated one) owns a single worker thread; all I/O completions, timer
//! expiries and user callbacks run there, posted to from any thread through
//! the cheap [`Connection`] handle.

mod callbacks;
mod executor;
mod handshake;
mod read;
mod write;

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod listener;
pub mod message;
pub mod stream;

mod tests;

pub use client::{Client, ClientHandle};
pub use config::{EndpointConfig, TlsServerIdentity};
pub use connection::Connection;
pub use error::Error;
pub use frame::{close_code, OpCode};
pub use listener::{Listener, ListenerHandle};
pub use message::{Message, OutboundMessage};
