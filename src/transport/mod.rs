//! # Transport Layer
//!
//! The byte stream underneath a link. The protocol core only needs three things
//! from it: open a connection to an address, queue bytes for sending, and close.
//! Inbound bytes and disconnection are pushed into the connection by whoever
//! drives the socket (see [`tcp::drive`]).
//!
//! ## Implementations
//! - [`tcp::TcpTransport`]: tokio TCP with a dedicated writer task
//! - [`memory::MemoryTransport`]: in-process capture for tests and simulations

use std::future::Future;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::error::Result;

pub mod memory;
pub mod tcp;

/// Byte-stream transport used by a [`ServerConnection`](crate::protocol::connection::ServerConnection)
pub trait Transport: Send {
    /// Open the stream to `address`, replacing any previous one
    fn connect(&mut self, address: SocketAddr) -> impl Future<Output = Result<()>> + Send;

    /// Queue one complete frame; must not block
    fn send(&mut self, frame: Bytes) -> Result<()>;

    /// Release the stream; later sends fail until the next connect
    fn close(&mut self);
}
