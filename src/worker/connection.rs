//! Per-link connection state.
//!
//! A [`Connection`] is created whole on every (re)connect and dropped whole on
//! teardown; nothing about a live link is patched in place.

use std::time::Duration;

use tokio::time::{timeout, Instant};

use super::liveness::Liveness;
use crate::error::{MdpError, Result};
use crate::protocol::Message;
use crate::transport::Transport;

/// Outcome of one bounded poll.
#[derive(Debug)]
pub(crate) enum Poll {
    /// A message arrived; liveness has already been reset.
    Message(Message),
    /// The interval elapsed with nothing received.
    Idle,
    /// The transport failed.
    Failed(MdpError),
}

pub(crate) struct Connection<T> {
    transport: T,
    liveness: Liveness,
    heartbeat_at: Instant,
    generation: u64,
}

impl<T: Transport> Connection<T> {
    /// Wrap a freshly opened transport: full liveness, first heartbeat one
    /// interval from now.
    pub(crate) fn open(transport: T, heartbeat_interval: Duration, generation: u64) -> Self {
        Self {
            transport,
            liveness: Liveness::new(),
            heartbeat_at: Instant::now() + heartbeat_interval,
            generation,
        }
    }

    pub(crate) async fn send(&mut self, message: Message) -> Result<()> {
        self.transport.send(message).await
    }

    /// Wait up to `interval` for one message.
    pub(crate) async fn poll(&mut self, interval: Duration) -> Poll {
        match timeout(interval, self.transport.recv()).await {
            Ok(Ok(message)) => {
                self.liveness.reset();
                Poll::Message(message)
            }
            Ok(Err(err)) => Poll::Failed(err),
            Err(_elapsed) => Poll::Idle,
        }
    }

    /// Record an idle interval; returns the liveness left.
    pub(crate) fn record_idle(&mut self) -> u32 {
        self.liveness.decrement()
    }

    pub(crate) fn liveness(&self) -> u32 {
        self.liveness.remaining()
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.liveness.is_exhausted()
    }

    pub(crate) fn heartbeat_due(&self, now: Instant) -> bool {
        now >= self.heartbeat_at
    }

    /// Advance the heartbeat deadline by one interval, re-anchoring on `now`
    /// if the deadline fell more than an interval behind.
    pub(crate) fn schedule_next_heartbeat(&mut self, now: Instant, interval: Duration) {
        self.heartbeat_at += interval;
        if self.heartbeat_at <= now {
            self.heartbeat_at = now + interval;
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Release the transport.
    pub(crate) async fn close(mut self) {
        if let Err(err) = self.transport.close().await {
            tracing::debug!("Error while closing broker link: {}", err);
        }
    }
}
