//! # Link Protocol
//!
//! Session-level behavior on top of the framing layer.
//!
//! ## Components
//! - **Dictionary**: mirrored handler name interning
//! - **Handshake**: identity, ports and attributes exchanged on open
//! - **Connection**: lifecycle state machine driving handshakes and dispatch
//! - **Dispatcher**: tag-keyed handler registry
//! - **Membership**: channel bridge for connect/disconnect notifications

pub mod connection;
pub mod dictionary;
pub mod dispatcher;
pub mod handshake;
pub mod membership;

#[cfg(test)]
mod tests;
