//! Peer handshake: the system frame exchanged when a link opens.
//!
//! Sent under the empty tag, it announces who this node is and where it can be
//! reached:
//!
//! ```text
//! hostName:  string8
//! portCount: u8
//! portCount × (protocolName: string8, port: u16)
//! remaining: (key: string8, value: string8)* until the payload is exhausted
//! ```
//!
//! Receiving the peer's handshake is the only transition from "transport open"
//! to "protocol ready" (see [`ServerConnection`](super::connection::ServerConnection)).

use std::collections::BTreeMap;

use tracing::{instrument, warn};

use crate::core::binary::PayloadReader;
use crate::core::message::OutgoingMessage;
use crate::error::{ProtocolError, Result};

/// At most this many port pairs fit the one-byte count
pub const MAX_ADVERTISED_PORTS: usize = u8::MAX as usize;

/// Identity, listening ports and metadata announced by one side of a link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    pub host: String,
    pub ports: BTreeMap<String, u16>,
    pub attributes: BTreeMap<String, String>,
}

impl Handshake {
    /// Encode into a fresh message body
    pub fn to_message(&self) -> OutgoingMessage {
        let mut message = OutgoingMessage::new();
        self.write_to(&mut message);
        message
    }

    pub fn write_to(&self, message: &mut OutgoingMessage) {
        message.put_string8(&self.host);

        if self.ports.len() > MAX_ADVERTISED_PORTS {
            warn!(
                ports = self.ports.len(),
                "Too many advertised ports, only the first {} are sent", MAX_ADVERTISED_PORTS
            );
        }
        let count = self.ports.len().min(MAX_ADVERTISED_PORTS);
        message.put_u8(count as u8);
        for (protocol, port) in self.ports.iter().take(count) {
            message.put_string8(protocol);
            message.put_u16(*port);
        }

        for (key, value) in &self.attributes {
            message.put_string8(key);
            message.put_string8(value);
        }
    }

    /// Decode a handshake payload
    ///
    /// # Errors
    /// `HandshakeError` when any field is cut short.
    #[instrument(level = "trace", skip_all, fields(len = reader.available()))]
    pub fn read_from(reader: &mut PayloadReader) -> Result<Self> {
        Self::read_fields(reader).map_err(|e| ProtocolError::HandshakeError(e.to_string()))
    }

    fn read_fields(reader: &mut PayloadReader) -> Result<Self> {
        let host = reader.read_string8()?;

        let mut ports = BTreeMap::new();
        let count = reader.read_u8()?;
        for _ in 0..count {
            let protocol = reader.read_string8()?;
            let port = reader.read_u16()?;
            ports.insert(protocol, port);
        }

        let mut attributes = BTreeMap::new();
        while !reader.is_empty() {
            let key = reader.read_string8()?;
            let value = reader.read_string8()?;
            attributes.insert(key, value);
        }

        Ok(Self {
            host,
            ports,
            attributes,
        })
    }
}
