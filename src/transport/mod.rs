//! Transport module - the message-transport seam the worker drives.
//!
//! The worker needs four things from a transport: open a connection to an
//! address, send a multipart message, receive one, and release the
//! connection. The bounded poll is
//! `tokio::time::timeout(interval, transport.recv())`, which is why
//! [`Transport::recv`] must be cancellation-safe.
//!
//! Implementations:
//! - [`SocketConnector`]: `tcp://host:port` and (Unix) `ipc:///path`
//! - [`MemoryConnector`]: in-process channels, for tests and embedding

mod memory;
mod socket;
mod stream;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::Message;

pub use memory::{MemoryBroker, MemoryConnector, MemoryPeer, MemoryTransport};
pub use socket::{Endpoint, SocketConnector, SocketStream, SocketTransport};
pub use stream::StreamTransport;

/// A connected, message-oriented link to the broker.
#[async_trait]
pub trait Transport: Send {
    /// Send one multipart message.
    async fn send(&mut self, message: Message) -> Result<()>;

    /// Receive the next multipart message.
    ///
    /// Must be cancellation-safe: if the returned future is dropped before
    /// completion, no part of an inbound message may be lost.
    async fn recv(&mut self) -> Result<Message>;

    /// Release the link. Dropping the transport must release it as well.
    async fn close(&mut self) -> Result<()>;
}

/// Factory for fresh transports. Every call to `connect` yields a new link;
/// nothing is reused across reconnects.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Transport type produced by this connector.
    type Transport: Transport;

    /// Open a new link to `address`.
    async fn connect(&self, address: &str) -> Result<Self::Transport>;

    /// Check address syntax without connecting.
    ///
    /// Called once when the worker is constructed so that typos fail fast
    /// with [`MdpError::InvalidArgument`](crate::MdpError::InvalidArgument)
    /// instead of being retried forever.
    fn check_address(&self, _address: &str) -> Result<()> {
        Ok(())
    }
}
