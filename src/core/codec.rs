//! # Link Codec
//!
//! Per-link framing state: the two handler dictionaries and the length of the
//! frame currently being received.
//!
//! Outbound, [`LinkCodec::assemble`] chooses between an inline tag and a
//! back-reference and writes the header in front of an [`OutgoingMessage`].
//! Inbound, the [`Decoder`] implementation pulls one complete frame at a time off
//! a growing `BytesMut`; partial input is left in place untouched, so the caller
//! may append more bytes at any split point and call again.
//!
//! ## Errors
//! Short input is never an error. Unresolved back-references are logged and the
//! frame is handed out with an empty tag. Only inconsistent input (empty body, a
//! tag overrunning its frame, a malformed reference, a frame above the configured
//! limit) yields a [`ProtocolError`].

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{error, trace, warn};

use super::binary::{truncate_str, PayloadReader};
use super::frame::{InboundFrame, TagHeader, LENGTH_FIELD_SIZE, MAX_TAG_LEN};
use super::message::OutgoingMessage;
use crate::config::{DEFAULT_READ_BUFFER, MAX_FRAME_SIZE};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dictionary::{ReceiveDictionary, SendDictionary, SendRef};

/// Framing state for one link
#[derive(Debug)]
pub struct LinkCodec {
    sending: SendDictionary,
    receiving: ReceiveDictionary,
    /// Body length of the frame being received, once its prefix has arrived
    pending: Option<usize>,
    max_frame_size: usize,
    /// Frames assembled with a back-reference since the last reset
    referenced_frames: u64,
    /// Inbound back-references that matched no known name since the last reset
    unresolved: u64,
}

impl Default for LinkCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl LinkCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            sending: SendDictionary::new(),
            receiving: ReceiveDictionary::new(),
            pending: None,
            max_frame_size,
            referenced_frames: 0,
            unresolved: 0,
        }
    }

    pub fn sending(&self) -> &SendDictionary {
        &self.sending
    }

    pub fn receiving(&self) -> &ReceiveDictionary {
        &self.receiving
    }

    /// Body length of a partially received frame
    pub fn pending_len(&self) -> Option<usize> {
        self.pending
    }

    /// Drop all session state: dictionaries and any partial frame
    pub fn reset(&mut self) {
        self.sending.clear();
        self.receiving.clear();
        self.pending = None;
        self.referenced_frames = 0;
        self.unresolved = 0;
    }

    /// Frame `message` under `tag`; an empty tag produces a system frame
    ///
    /// Tags longer than 255 bytes are cut to 255 on a character boundary and
    /// registered in their truncated form.
    pub fn assemble(&mut self, tag: &str, message: OutgoingMessage) -> Result<Bytes> {
        let name = truncate_str(tag, MAX_TAG_LEN);
        if name.len() < tag.len() {
            warn!(
                handler = name,
                original_len = tag.len(),
                "Handler name truncated to {} bytes (maximum acceptable size)",
                MAX_TAG_LEN
            );
        }

        let header = if name.is_empty() {
            TagHeader::System
        } else {
            match self.sending.resolve(name) {
                SendRef::Known(reference) => {
                    self.referenced_frames += 1;
                    TagHeader::Reference(reference)
                }
                SendRef::Registered(reference) => {
                    trace!(handler = name, reference, "Registered outgoing handler");
                    TagHeader::Name(name)
                }
            }
        };

        message.into_frame(header)
    }

    /// Frames sent by reference rather than by name since the last reset
    pub fn referenced_frames(&self) -> u64 {
        self.referenced_frames
    }

    /// Inbound references that could not be resolved since the last reset
    pub fn unresolved_references(&self) -> u64 {
        self.unresolved
    }

    fn decode_tag(&mut self, body: &mut PayloadReader) -> Result<String> {
        let name_len = body.read_u8()? as usize;
        if name_len > 0 {
            if name_len > body.available() {
                return Err(ProtocolError::InvalidHeader(constants::ERR_TAG_OVERRUN));
            }
            let name = body.read_raw(name_len)?;
            let name = String::from_utf8_lossy(&name).into_owned();
            let reference = self.receiving.register(name.clone());
            trace!(handler = %name, reference, "Registered incoming handler");
            return Ok(name);
        }

        let reference = body.read_7bit_encoded()?;
        if reference == 0 {
            return Ok(String::new());
        }
        match self.receiving.lookup(reference) {
            Some(name) => Ok(name.to_owned()),
            None => {
                self.unresolved += 1;
                error!(
                    reference,
                    known = self.receiving.len(),
                    "Impossible to find the handler reference"
                );
                Ok(String::new())
            }
        }
    }
}

impl Decoder for LinkCodec {
    type Item = InboundFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let body_len = match self.pending {
            Some(len) => len,
            None => {
                if src.len() < LENGTH_FIELD_SIZE {
                    return Ok(None);
                }
                let mut prefix = [0u8; LENGTH_FIELD_SIZE];
                prefix.copy_from_slice(&src[..LENGTH_FIELD_SIZE]);
                let len = u32::from_be_bytes(prefix) as usize;
                if len > self.max_frame_size {
                    return Err(ProtocolError::OversizedFrame(len));
                }
                self.pending = Some(len);
                len
            }
        };

        let frame_len = LENGTH_FIELD_SIZE + body_len;
        if src.len() < frame_len {
            // grow with the input, not with the length the peer announced
            src.reserve((frame_len - src.len()).min(DEFAULT_READ_BUFFER));
            return Ok(None);
        }

        self.pending = None;
        src.advance(LENGTH_FIELD_SIZE);
        let body = src.split_to(body_len).freeze();
        if body.is_empty() {
            return Err(ProtocolError::InvalidHeader(constants::ERR_EMPTY_BODY));
        }

        let mut body = PayloadReader::new(body);
        let tag = self.decode_tag(&mut body)?;
        Ok(Some(InboundFrame {
            tag,
            payload: body.into_bytes(),
        }))
    }
}
