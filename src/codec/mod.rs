//! Codec module - optional serialization for request and reply bodies.
//!
//! The worker treats bodies as opaque frames. [`MsgPackCodec`] is provided for
//! callers that exchange structured payloads; see also
//! [`Message::from_msgpack`](crate::protocol::Message::from_msgpack) and
//! [`Message::decode_frame`](crate::protocol::Message::decode_frame).
//!
//! Codecs are marker structs with static methods rather than trait objects.

mod msgpack;

pub use msgpack::MsgPackCodec;
