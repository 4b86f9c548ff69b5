//! Wire module - multipart framing for byte-stream transports.
//!
//! This module implements the framing used by
//! [`StreamTransport`](crate::transport::StreamTransport):
//! - 5-byte frame header encoding/decoding (flags + length)
//! - Message buffer for accumulating partial reads

mod message_buffer;
mod wire_format;

pub use message_buffer::MessageBuffer;
pub use wire_format::{
    encode_message, flags, FrameHeader, ABSOLUTE_MAX_FRAME_SIZE, DEFAULT_MAX_FRAME_SIZE,
    FRAME_HEADER_SIZE,
};
