//! Message buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 5 bytes
//! - `WaitingForBody`: Header parsed, need N more body bytes
//!
//! Completed frames collect into the pending message until a frame without
//! the MORE flag closes it.

use bytes::{Bytes, BytesMut};

use super::wire_format::{FrameHeader, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE};
use crate::error::Result;
use crate::protocol::Message;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 5 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for body bytes.
    WaitingForBody { header: FrameHeader },
}

/// Buffer for accumulating incoming bytes and extracting complete messages.
pub struct MessageBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Frames of the message currently being assembled.
    pending: Vec<Bytes>,
    /// Maximum allowed frame body size.
    max_frame_size: u32,
}

impl MessageBuffer {
    /// Create a new buffer with default settings.
    ///
    /// Default capacity: 64KB, max frame: 256 MiB.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new buffer with custom max frame size.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            pending: Vec::new(),
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// Partial frames and partial messages stay buffered for the next push.
    ///
    /// # Errors
    ///
    /// Returns error if a frame exceeds the max size or uses reserved flags.
    /// The stream is unrecoverable after an error.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Message>> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(message) = self.try_extract_one()? {
            messages.push(message);
        }

        Ok(messages)
    }

    /// Try to extract a single message from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Message>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    let Some(header) = FrameHeader::decode(&self.buffer) else {
                        return Ok(None);
                    };
                    header.validate(self.max_frame_size)?;

                    let _ = self.buffer.split_to(FRAME_HEADER_SIZE);
                    self.state = State::WaitingForBody { header };
                }

                State::WaitingForBody { header } => {
                    let length = header.length as usize;
                    if self.buffer.len() < length {
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(length).freeze();
                    self.pending.push(body);
                    self.state = State::WaitingForHeader;

                    if !header.has_more() {
                        let frames = std::mem::take(&mut self.pending);
                        return Ok(Some(Message::from(frames)));
                    }
                }
            }
        }
    }

    /// Get the number of buffered, not yet parsed bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing is buffered, including partial messages.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
            && self.pending.is_empty()
            && matches!(self.state, State::WaitingForHeader)
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("buffered", &self.buffer.len())
            .field("pending_frames", &self.pending.len())
            .field("state", &self.state)
            .finish()
    }
}
