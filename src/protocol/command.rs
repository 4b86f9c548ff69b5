//! Worker command codes.
//!
//! One byte on the wire, third frame of every envelope:
//!
//! | Code | Command    | Direction        |
//! |------|------------|------------------|
//! | 0x01 | READY      | worker → broker  |
//! | 0x02 | REQUEST    | broker → worker  |
//! | 0x03 | REPLY      | worker → broker  |
//! | 0x04 | HEARTBEAT  | both             |
//! | 0x05 | DISCONNECT | both             |
//! | 0x06 | KILL       | broker → worker  |

use std::fmt;

/// A worker protocol command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Worker announces the service it offers.
    Ready = 0x01,
    /// Broker forwards a client request.
    Request = 0x02,
    /// Worker returns a reply for the last request.
    Reply = 0x03,
    /// Liveness signal.
    Heartbeat = 0x04,
    /// Peer asks for the link to be re-established.
    Disconnect = 0x05,
    /// Broker tells the worker to stop.
    Kill = 0x06,
}

impl Command {
    /// Wire code of this command.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode a wire code. Returns `None` for codes outside the table.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Ready),
            0x02 => Some(Self::Request),
            0x03 => Some(Self::Reply),
            0x04 => Some(Self::Heartbeat),
            0x05 => Some(Self::Disconnect),
            0x06 => Some(Self::Kill),
            _ => None,
        }
    }

    /// Upper-case protocol name, as used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Request => "REQUEST",
            Self::Reply => "REPLY",
            Self::Heartbeat => "HEARTBEAT",
            Self::Disconnect => "DISCONNECT",
            Self::Kill => "KILL",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
