//! Worker envelope encoding and decoding.
//!
//! Every worker message starts with the same three frames:
//!
//! ```text
//! ┌───────┬──────────┬─────────┬────────────────────────────┐
//! │ ""    │ "MDPW01" │ command │ command-specific frames... │
//! └───────┴──────────┴─────────┴────────────────────────────┘
//! ```
//!
//! Inbound messages that do not match this prefix are rejected, never repaired.

use bytes::Bytes;

use super::command::Command;
use super::message::Message;
use crate::error::{MdpError, Result};

/// Protocol identifier for the worker side of Majordomo 0.1.
pub const MDPW_WORKER: &[u8] = b"MDPW01";

/// Minimum frame count of any valid envelope (delimiter, protocol, command).
pub const MIN_ENVELOPE_FRAMES: usize = 3;

/// Build an outbound envelope.
///
/// Prepends, in order, the empty delimiter, the protocol identifier, the
/// command byte and (if present) a data frame onto the frames of `base`.
///
/// # Example
///
/// ```
/// use mdp_worker::protocol::{build_envelope, Command, Message};
///
/// let ready = build_envelope(Command::Ready, Some("echo".into()), None);
/// assert_eq!(ready, Message::from_frames([&b""[..], b"MDPW01", &[0x01], b"echo"]));
/// ```
pub fn build_envelope(command: Command, data: Option<Bytes>, base: Option<Message>) -> Message {
    let mut message = base.unwrap_or_default();
    if let Some(data) = data {
        message.push_front(data);
    }
    message.push_front(Bytes::copy_from_slice(&[command.code()]));
    message.push_front(Bytes::from_static(MDPW_WORKER));
    message.push_front(Bytes::new());
    message
}

/// An inbound envelope with its prefix stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Raw command byte; may be outside the known command table.
    pub code: u8,
    /// Remaining frames after the command.
    pub body: Message,
}

impl Envelope {
    /// The decoded command, if the code is known.
    pub fn command(&self) -> Option<Command> {
        Command::from_code(self.code)
    }
}

/// Validate and strip the envelope prefix of an inbound message.
///
/// Checks, in order: frame count, empty delimiter, protocol identifier,
/// one-byte command frame.
pub fn open_envelope(mut message: Message) -> Result<Envelope> {
    if message.len() < MIN_ENVELOPE_FRAMES {
        return Err(MdpError::protocol(format!(
            "malformed message: expected at least {} frames, got {}",
            MIN_ENVELOPE_FRAMES,
            message.len()
        )));
    }

    // Length was checked above, so the three pops below always yield frames.
    let delimiter = message.pop_front().unwrap_or_default();
    if !delimiter.is_empty() {
        return Err(MdpError::protocol("missing delimiter"));
    }

    let protocol = message.pop_front().unwrap_or_default();
    if protocol.as_ref() != MDPW_WORKER {
        return Err(MdpError::protocol(format!(
            "unknown protocol {:?}",
            String::from_utf8_lossy(&protocol)
        )));
    }

    let command = message.pop_front().unwrap_or_default();
    if command.len() != 1 {
        return Err(MdpError::protocol(format!(
            "invalid command frame of {} bytes",
            command.len()
        )));
    }

    Ok(Envelope {
        code: command[0],
        body: message,
    })
}
