//! Stream frame header encoding and decoding.
//!
//! Implements the 5-byte frame header used on byte-stream transports:
//! ```text
//! ┌───────┬──────────┐
//! │ Flags │ Length   │
//! │ 1 byte│ 4 bytes  │
//! │       │ uint32 BE│
//! └───────┴──────────┘
//! ```
//!
//! A multipart message is a run of frames; every frame except the last has
//! the MORE flag set.

use bytes::{BufMut, BytesMut};

use crate::error::{MdpError, Result};
use crate::protocol::Message;

/// Frame header size in bytes (fixed, exactly 5).
pub const FRAME_HEADER_SIZE: usize = 5;

/// Default maximum frame body size (256 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 256 * 1024 * 1024;

/// Absolute maximum frame body size (~2 GB, max i32).
pub const ABSOLUTE_MAX_FRAME_SIZE: u32 = 2_147_483_647;

/// Flag constants for the frame header.
pub mod flags {
    /// More frames of the same message follow.
    pub const MORE: u8 = 0b0000_0001;

    /// Reserved bits mask (bits 1-7).
    pub const RESERVED_MASK: u8 = 0b1111_1110;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Frame body length in bytes.
    pub length: u32,
}

impl FrameHeader {
    /// Create a new header.
    pub fn new(flags: u8, length: u32) -> Self {
        Self { flags, length }
    }

    /// Encode header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0] = self.flags;
        buf[1..5].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }
        Some(Self {
            flags: buf[0],
            length: u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Reserved flag bits are 0
    /// - Length doesn't exceed max
    pub fn validate(&self, max_frame_size: u32) -> Result<()> {
        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(MdpError::protocol("Reserved frame flag bits must be 0"));
        }

        if self.length > max_frame_size {
            return Err(MdpError::protocol(format!(
                "Frame size {} exceeds maximum {}",
                self.length, max_frame_size
            )));
        }

        Ok(())
    }

    /// Check if more frames of the same message follow.
    #[inline]
    pub fn has_more(&self) -> bool {
        flags::has_flag(self.flags, flags::MORE)
    }
}

/// Append the stream encoding of `message` to `dst`.
///
/// # Errors
///
/// Returns a protocol error for an empty message (it has no last frame to
/// terminate it) or a frame longer than [`ABSOLUTE_MAX_FRAME_SIZE`].
pub fn encode_message(message: &Message, dst: &mut BytesMut) -> Result<()> {
    if message.is_empty() {
        return Err(MdpError::protocol("cannot encode a message with no frames"));
    }

    dst.reserve(message.len() * FRAME_HEADER_SIZE + message.byte_len());

    let last = message.len() - 1;
    for (index, frame) in message.iter().enumerate() {
        let length = u32::try_from(frame.len())
            .ok()
            .filter(|len| *len <= ABSOLUTE_MAX_FRAME_SIZE)
            .ok_or_else(|| {
                MdpError::protocol(format!("Frame size {} is not encodable", frame.len()))
            })?;
        let flags = if index < last { flags::MORE } else { 0 };

        dst.put_slice(&FrameHeader::new(flags, length).encode());
        dst.put_slice(frame);
    }

    Ok(())
}
