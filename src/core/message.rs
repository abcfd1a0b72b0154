//! Outgoing message buffer with a reserved header prefix.
//!
//! The payload is written after [`MAX_HEADER_SIZE`] bytes of scratch space. Once
//! the tag encoding is known, the header is written at the tail end of that space
//! and the unused front is skipped, leaving `[header | payload]` contiguous in the
//! original allocation. The payload is never copied.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::binary::WireBufMut;
use super::frame::{TagHeader, LENGTH_FIELD_SIZE, MAX_HEADER_SIZE};
use crate::error::{ProtocolError, Result};

const DEFAULT_PAYLOAD_CAPACITY: usize = 256;

/// Payload under construction, ready to be framed by
/// [`LinkCodec::assemble`](crate::core::codec::LinkCodec::assemble)
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    buf: BytesMut,
}

impl Default for OutgoingMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl OutgoingMessage {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PAYLOAD_CAPACITY)
    }

    /// Allocate once for the header reservation plus `payload_capacity`
    pub fn with_capacity(payload_capacity: usize) -> Self {
        let mut buf = BytesMut::with_capacity(MAX_HEADER_SIZE + payload_capacity);
        buf.resize(MAX_HEADER_SIZE, 0);
        Self { buf }
    }

    pub fn from_payload(payload: &[u8]) -> Self {
        let mut message = Self::with_capacity(payload.len());
        message.put_slice(payload);
        message
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[MAX_HEADER_SIZE..]
    }

    pub fn payload_len(&self) -> usize {
        self.buf.len() - MAX_HEADER_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.payload_len() == 0
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn put_7bit_encoded(&mut self, value: u32) {
        self.buf.put_7bit_encoded(value);
    }

    pub fn put_string8(&mut self, value: &str) {
        self.buf.put_string8(value);
    }

    pub fn put_slice(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }

    /// Write the frame header in front of the payload and hand back the frame
    ///
    /// # Errors
    /// `OversizedFrame` when the body length does not fit the 32-bit prefix.
    pub(crate) fn into_frame(mut self, tag: TagHeader<'_>) -> Result<Bytes> {
        let header_len = tag.header_len();
        let body_len = self.payload_len() + header_len - LENGTH_FIELD_SIZE;
        let body_len = u32::try_from(body_len).map_err(|_| ProtocolError::OversizedFrame(body_len))?;

        let start = MAX_HEADER_SIZE - header_len;
        {
            let mut header = &mut self.buf[start..MAX_HEADER_SIZE];
            header.put_u32(body_len);
            tag.write(&mut header);
            debug_assert!(header.is_empty());
        }
        self.buf.advance(start);
        Ok(self.buf.freeze())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_is_empty() {
        let message = OutgoingMessage::new();
        assert!(message.is_empty());
        assert_eq!(message.payload(), b"");
    }

    #[test]
    fn test_frame_layout_with_name() {
        let message = OutgoingMessage::from_payload(b"hello");
        let frame = message.into_frame(TagHeader::Name("chat")).unwrap();

        assert_eq!(&frame[..4], &(1 + 4 + 5u32).to_be_bytes());
        assert_eq!(frame[4], 4);
        assert_eq!(&frame[5..9], b"chat");
        assert_eq!(&frame[9..], b"hello");
    }

    #[test]
    fn test_frame_layout_system() {
        let frame = OutgoingMessage::from_payload(b"x")
            .into_frame(TagHeader::System)
            .unwrap();
        assert_eq!(&frame[..], &[0, 0, 0, 3, 0, 0, b'x']);
    }

    #[test]
    fn test_frame_layout_reference() {
        let frame = OutgoingMessage::new()
            .into_frame(TagHeader::Reference(300))
            .unwrap();
        assert_eq!(&frame[..], &[0, 0, 0, 3, 0, 0xAC, 0x02]);
    }

    #[test]
    fn test_payload_is_not_copied() {
        let mut message = OutgoingMessage::with_capacity(64);
        message.put_slice(&[7u8; 64]);
        let payload_ptr = message.payload().as_ptr();

        let header = TagHeader::Name("stream");
        let frame = message.into_frame(header).unwrap();
        assert_eq!(frame[header.header_len()..].as_ptr(), payload_ptr);
        assert_eq!(frame.len(), header.header_len() + 64);
    }
}
