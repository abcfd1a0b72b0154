//! Frame layout shared by the assembler and the parser.
//!
//! ```text
//! Frame := bodyLength:u32 body
//! body  := tagNameLen:u8 [tagNameLen > 0 ? tagName:bytes[tagNameLen] : tagRef:7bit]
//!          payload:bytes
//! ```

use bytes::{BufMut, Bytes};

use super::binary::{encoded_7bit_len, PayloadReader, WireBufMut};

/// Size of the big-endian body length prefix
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Longest tag name carried inline
pub const MAX_TAG_LEN: usize = u8::MAX as usize;

/// Scratch space reserved in front of every outgoing payload. An inline name is
/// always at least as large as a reference, so the name case bounds the header.
pub const MAX_HEADER_SIZE: usize = LENGTH_FIELD_SIZE + 1 + MAX_TAG_LEN;

/// How the tag of one outgoing frame is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagHeader<'a> {
    /// Empty name followed by the zero reference (handshake frames)
    System,
    /// First use of a tag: the literal name
    Name(&'a str),
    /// Back-reference to a name sent earlier on this link
    Reference(u32),
}

impl TagHeader<'_> {
    /// Bytes the tag field occupies, name length byte included
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            TagHeader::System => 1,
            TagHeader::Name(name) => name.len(),
            TagHeader::Reference(reference) => encoded_7bit_len(*reference),
        }
    }

    /// Full header size, length prefix included
    pub fn header_len(&self) -> usize {
        LENGTH_FIELD_SIZE + self.encoded_len()
    }

    pub(crate) fn write<B: BufMut>(&self, buf: &mut B) {
        match self {
            TagHeader::System => {
                buf.put_u8(0);
                buf.put_7bit_encoded(0);
            }
            TagHeader::Name(name) => {
                debug_assert!(!name.is_empty() && name.len() <= MAX_TAG_LEN);
                buf.put_u8(name.len() as u8);
                buf.put_slice(name.as_bytes());
            }
            TagHeader::Reference(reference) => {
                buf.put_u8(0);
                buf.put_7bit_encoded(*reference);
            }
        }
    }
}

/// One decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Resolved tag; empty for system frames and unresolved references
    pub tag: String,
    /// Bytes following the tag field
    pub payload: Bytes,
}

impl InboundFrame {
    pub fn is_system(&self) -> bool {
        self.tag.is_empty()
    }

    pub fn reader(&self) -> PayloadReader {
        PayloadReader::new(self.payload.clone())
    }
}
