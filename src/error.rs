//! # Error Types
//!
//! Error handling for the cluster link protocol.
//!
//! ## Error Categories
//! - **I/O Errors**: socket and file system failures
//! - **Decode Errors**: truncated fields, malformed varints, oversized frames
//! - **Link Errors**: closed transports, failed handshakes, unknown handlers
//! - **Configuration Errors**: invalid or unreadable configuration
//!
//! Most of these never leave the crate: sending, connecting and dispatching log
//! their failures instead of returning them. Only genuinely inconsistent inbound
//! state (see [`LinkCodec`](crate::core::codec::LinkCodec)) is propagated to the
//! driver, which then closes the link.
//!
//! ## Example Usage
//! ```rust
//! use cluster_link::core::binary::PayloadReader;
//! use cluster_link::error::{ProtocolError, Result};
//!
//! fn read_port(reader: &mut PayloadReader) -> Result<u16> {
//!     reader.read_u16()
//! }
//!
//! let mut reader = PayloadReader::new(bytes::Bytes::from_static(&[0x07]));
//! assert!(matches!(read_port(&mut reader), Err(ProtocolError::Truncated { .. })));
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Frame validation errors
    pub const ERR_EMPTY_BODY: &str = "Frame body is empty";
    pub const ERR_TAG_OVERRUN: &str = "Tag name length exceeds frame body";

    /// Link errors
    pub const ERR_NOT_CONNECTED: &str = "Transport is not connected";
    pub const ERR_WRITER_GONE: &str = "Writer task has stopped";
    pub const ERR_PEER_CLOSED: &str = "Peer closed the connection";
}

/// Primary error type for all link operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid frame header: {0}")]
    InvalidHeader(&'static str),

    #[error("Truncated field: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Variable-length integer overflows 32 bits")]
    VarintOverflow,

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("No handler registered for '{0}'")]
    UnexpectedMessage(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
