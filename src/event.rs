//! Diagnostic events emitted by the worker.
//!
//! Every event is also logged through `tracing` at the point where it
//! happens; the broadcast stream exists for callers that want to react to
//! connection state programmatically (health checks, metrics, tests).
//!
//! ```ignore
//! let mut events = worker.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let WorkerEvent::Disconnected { reason } = event {
//!             eprintln!("broker link lost: {reason}");
//!         }
//!     }
//! });
//! ```

use std::fmt;

use tokio::sync::broadcast;

use crate::protocol::Command;

/// Default capacity for the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why a broker link was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Too many heartbeat intervals passed without hearing from the broker.
    LivenessExhausted,
    /// The broker sent DISCONNECT.
    BrokerRequested,
    /// The transport failed (I/O error, peer closed, corrupt framing).
    TransportFailure(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LivenessExhausted => f.write_str("liveness exhausted"),
            Self::BrokerRequested => f.write_str("broker requested disconnect"),
            Self::TransportFailure(error) => write!(f, "transport failure: {}", error),
        }
    }
}

/// Worker diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A connection attempt is starting.
    Connecting {
        /// Broker address.
        broker: String,
    },

    /// A connection attempt failed; it will be retried after the reconnect delay.
    ConnectFailed {
        /// Broker address.
        broker: String,
        /// Error message.
        error: String,
    },

    /// Connected and READY sent.
    Connected {
        /// Broker address.
        broker: String,
        /// Number of successful connects so far, including this one.
        generation: u64,
    },

    /// An envelope was sent to the broker.
    Sent {
        /// Command sent.
        command: Command,
    },

    /// A well-formed envelope with a known command was received.
    Received {
        /// Command received.
        command: Command,
    },

    /// A poll interval elapsed with nothing received.
    Idle {
        /// Liveness remaining after the decrement.
        liveness: u32,
    },

    /// The broker link was torn down and will be re-established.
    Disconnected {
        /// Why the link was dropped.
        reason: DisconnectReason,
    },

    /// An envelope carried a command the worker does not handle; it was dropped.
    UnknownCommand {
        /// Raw command byte.
        code: u8,
    },

    /// An inbound message or a caller reply violated the protocol.
    ProtocolViolation {
        /// Error message.
        message: String,
    },

    /// The broker sent KILL; the worker has stopped.
    Killed,

    /// The connection was released by the caller.
    Closed,
}

/// Broadcast sender wrapper; emitting never blocks and never fails.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<WorkerEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: WorkerEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}
