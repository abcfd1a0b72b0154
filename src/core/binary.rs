//! # Byte Codec
//!
//! Primitive field encoding shared by frame headers and payloads:
//! - fixed-width big-endian integers
//! - strings prefixed by a single length byte (`string8`)
//! - unsigned 7-bit continuation integers (`7bit`), little-endian groups,
//!   high bit set on every byte but the last
//!
//! Reading goes through [`PayloadReader`], which never panics on short input and
//! reports [`ProtocolError::Truncated`] instead. Writing is provided for any
//! [`BufMut`] through the [`WireBufMut`] extension trait.

use bytes::{Buf, BufMut, Bytes};
use tracing::warn;

use crate::error::{ProtocolError, Result};

/// A `u32` never needs more than five 7-bit groups
pub const MAX_7BIT_SIZE: usize = 5;

/// Longest string a `string8` field can carry
pub const MAX_STRING8_LEN: usize = u8::MAX as usize;

/// Number of bytes `value` occupies once 7-bit encoded
#[inline]
pub fn encoded_7bit_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

/// Cut `value` to at most `max` bytes without splitting a UTF-8 character
pub fn truncate_str(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Write helpers for the link's primitive encodings
pub trait WireBufMut: BufMut {
    /// Append `value` as a 7-bit continuation integer
    fn put_7bit_encoded(&mut self, mut value: u32) {
        while value >= 0x80 {
            self.put_u8(((value as u8) & 0x7F) | 0x80);
            value >>= 7;
        }
        self.put_u8(value as u8);
    }

    /// Append `value` behind a one-byte length, truncating to 255 bytes
    fn put_string8(&mut self, value: &str) {
        let fitted = truncate_str(value, MAX_STRING8_LEN);
        if fitted.len() < value.len() {
            warn!(
                original_len = value.len(),
                "String field truncated to {} bytes", MAX_STRING8_LEN
            );
        }
        self.put_u8(fitted.len() as u8);
        self.put_slice(fitted.as_bytes());
    }
}

impl<B: BufMut + ?Sized> WireBufMut for B {}

/// Cursor over an immutable payload
///
/// Reads consume from the front; slicing out raw sections is zero-copy since the
/// underlying storage is reference-counted [`Bytes`].
#[derive(Debug, Clone, Default)]
pub struct PayloadReader {
    buf: Bytes,
}

impl PayloadReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Bytes left to read
    #[inline]
    pub fn available(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Unread bytes, without consuming them
    pub fn remaining(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf
    }

    #[inline]
    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.len() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    /// Read a 7-bit continuation integer
    ///
    /// # Errors
    /// `Truncated` if the input ends mid-value, `VarintOverflow` if the value
    /// does not fit 32 bits.
    pub fn read_7bit_encoded(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for group in 0..MAX_7BIT_SIZE {
            let byte = self.read_u8()?;
            let bits = u32::from(byte & 0x7F);
            // fifth group only has room for the top four bits
            if group == MAX_7BIT_SIZE - 1 && bits > 0x0F {
                return Err(ProtocolError::VarintOverflow);
            }
            value |= bits << (7 * group);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::VarintOverflow)
    }

    /// Split `len` raw bytes off the front (zero-copy)
    pub fn read_raw(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Read a `string8` field; invalid UTF-8 is replaced rather than rejected
    pub fn read_string8(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        let raw = self.read_raw(len)?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

impl From<Bytes> for PayloadReader {
    fn from(buf: Bytes) -> Self {
        Self::new(buf)
    }
}
