//! # Core Framing Components
//!
//! Low-level frame handling between two cluster nodes.
//!
//! ## Components
//! - **Binary**: primitive field encodings (big-endian integers, `string8`, 7-bit integers)
//! - **Frame**: wire layout constants and tag encodings
//! - **Message**: outgoing payload buffer with a reserved header prefix
//! - **Codec**: per-link framing state, handler dictionaries, incremental decoding
//!
//! ## Wire Format
//! ```text
//! [BodyLength(4)] [TagNameLen(1)] [TagName(N) | TagRef(7bit)] [Payload]
//! ```
//!
//! ## Limits
//! - Tag names: 255 bytes
//! - Frame bodies: `max_frame_size` (16MB by default), checked before buffering

pub mod binary;
pub mod codec;
pub mod frame;
pub mod message;
