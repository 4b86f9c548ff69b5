//! Broker liveness countdown.

use crate::config::HEARTBEAT_LIVENESS;

/// Counts idle poll intervals down from [`HEARTBEAT_LIVENESS`].
///
/// Any inbound message resets it; reaching zero means the broker is presumed
/// gone and the link must be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Liveness {
    remaining: u32,
}

impl Liveness {
    pub(crate) fn new() -> Self {
        Self {
            remaining: HEARTBEAT_LIVENESS,
        }
    }

    /// Proof of life from the broker.
    pub(crate) fn reset(&mut self) {
        self.remaining = HEARTBEAT_LIVENESS;
    }

    /// Record one idle interval and return what is left.
    pub(crate) fn decrement(&mut self) -> u32 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }

    pub(crate) fn remaining(&self) -> u32 {
        self.remaining
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
