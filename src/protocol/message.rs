//! Multipart message type.
//!
//! A [`Message`] is an ordered list of frames. Frames are `bytes::Bytes`, so
//! moving a frame from an inbound request into an outbound reply never copies.
//!
//! # Example
//!
//! ```
//! use mdp_worker::protocol::{Message, ReturnAddress};
//!
//! let mut request = Message::from_frames(["client-1", "", "ping"]);
//! let address = request.pop_address().unwrap();
//! assert_eq!(request, Message::from_frames(["ping"]));
//!
//! let mut reply = Message::from_frames(["pong"]);
//! reply.push_address(address);
//! assert_eq!(reply, Message::from_frames(["client-1", "", "pong"]));
//! ```

use std::collections::VecDeque;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::{MdpError, Result};

/// An ordered sequence of frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    frames: VecDeque<Bytes>,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a message from anything convertible to frames.
    pub fn from_frames<I, B>(frames: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            frames: frames.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a single-frame message holding a MsgPack-encoded value.
    pub fn from_msgpack<T: Serialize>(value: &T) -> Result<Self> {
        let encoded = MsgPackCodec::encode(value)?;
        Ok(Self::from_frames([encoded]))
    }

    /// Decode frame `index` as MsgPack.
    pub fn decode_frame<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let frame = self.frames.get(index).ok_or_else(|| {
            MdpError::protocol(format!(
                "frame {} requested from a {}-frame message",
                index,
                self.frames.len()
            ))
        })?;
        MsgPackCodec::decode(frame)
    }

    /// Number of frames.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if the message has no frames.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Get a frame by position.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.frames.get(index)
    }

    /// First frame, if any.
    #[inline]
    pub fn first(&self) -> Option<&Bytes> {
        self.frames.front()
    }

    /// Iterate over frames in order.
    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.frames.iter()
    }

    /// Prepend a frame.
    pub fn push_front(&mut self, frame: impl Into<Bytes>) {
        self.frames.push_front(frame.into());
    }

    /// Append a frame.
    pub fn push_back(&mut self, frame: impl Into<Bytes>) {
        self.frames.push_back(frame.into());
    }

    /// Remove and return the first frame.
    pub fn pop_front(&mut self) -> Option<Bytes> {
        self.frames.pop_front()
    }

    /// Total body size across all frames.
    pub fn byte_len(&self) -> usize {
        self.frames.iter().map(Bytes::len).sum()
    }

    /// Consume the message and return its frames.
    pub fn into_frames(self) -> Vec<Bytes> {
        self.frames.into()
    }

    /// Unwrap a return-address stack: pop frames up to and including the
    /// next empty delimiter.
    ///
    /// Fails if no delimiter is found or the stack is empty. On failure the
    /// message is left in an unspecified, partially drained state.
    pub fn pop_address(&mut self) -> Result<ReturnAddress> {
        let mut frames = Vec::new();
        loop {
            match self.frames.pop_front() {
                Some(frame) if frame.is_empty() => break,
                Some(frame) => frames.push(frame),
                None => {
                    return Err(MdpError::protocol(
                        "malformed request: missing delimiter after return address",
                    ))
                }
            }
        }

        if frames.is_empty() {
            return Err(MdpError::protocol("malformed request: empty return address"));
        }

        Ok(ReturnAddress { frames })
    }

    /// Wrap with a return-address stack: push the address frames followed by
    /// an empty delimiter onto the front of the message.
    pub fn push_address(&mut self, address: ReturnAddress) {
        self.frames.push_front(Bytes::new());
        for frame in address.frames.into_iter().rev() {
            self.frames.push_front(frame);
        }
    }
}

impl<B: Into<Bytes>> FromIterator<B> for Message {
    fn from_iter<I: IntoIterator<Item = B>>(iter: I) -> Self {
        Self::from_frames(iter)
    }
}

impl From<Vec<Bytes>> for Message {
    fn from(frames: Vec<Bytes>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl IntoIterator for Message {
    type Item = Bytes;
    type IntoIter = std::collections::vec_deque::IntoIter<Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

/// Address frames captured from a request, used to route the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnAddress {
    frames: Vec<Bytes>,
}

impl ReturnAddress {
    /// Build an address stack from frames, outermost hop first.
    ///
    /// Returns `None` if `frames` is empty or contains an empty frame, since
    /// either would be indistinguishable from the delimiter on the wire.
    pub fn new<I, B>(frames: I) -> Option<Self>
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let frames: Vec<Bytes> = frames.into_iter().map(Into::into).collect();
        if frames.is_empty() || frames.iter().any(Bytes::is_empty) {
            return None;
        }
        Some(Self { frames })
    }

    /// Address frames, outermost hop first.
    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    /// Number of hops.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false: an address stack has at least one hop.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
