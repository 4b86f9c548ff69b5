//! Protocol module - worker commands, multipart messages and envelopes.
//!
//! This module implements the worker side of the Majordomo protocol:
//! - Command codes (READY, REQUEST, REPLY, HEARTBEAT, DISCONNECT, KILL)
//! - Multipart [`Message`] with return-address wrap/unwrap
//! - Envelope building and validation

mod command;
mod envelope;
mod message;

pub use command::Command;
pub use envelope::{build_envelope, open_envelope, Envelope, MDPW_WORKER, MIN_ENVELOPE_FRAMES};
pub use message::{Message, ReturnAddress};
