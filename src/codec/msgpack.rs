//! MsgPack codec using `rmp-serde`.
//!
//! Values are encoded straight into a frozen [`Bytes`] frame, ready to be
//! pushed onto a [`Message`](crate::protocol::Message). Structs are written as
//! maps keyed by field name.
//!
//! # Example
//!
//! ```
//! use mdp_worker::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Job {
//!     id: u32,
//!     input: String,
//! }
//!
//! let job = Job { id: 42, input: "thumbnail.png".to_string() };
//! let frame = MsgPackCodec::encode(&job).unwrap();
//! let decoded: Job = MsgPackCodec::decode(&frame).unwrap();
//! assert_eq!(decoded, job);
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// MessagePack codec for request and reply body frames.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode `value` as one body frame.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
        let mut writer = BytesMut::new().writer();
        rmp_serde::encode::write_named(&mut writer, value)?;
        Ok(writer.into_inner().freeze())
    }

    /// Decode one body frame.
    pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(frame)?)
    }
}
