//! In-process transport.
//!
//! [`MemoryConnector`] hands every new link to a [`MemoryBroker`], which
//! plays the broker side through [`MemoryPeer`]s. Each `connect` creates a
//! fresh channel pair, so a reconnect is observable as a new peer and the old
//! peer sees its link close.
//!
//! # Example
//!
//! ```
//! use mdp_worker::protocol::Message;
//! use mdp_worker::transport::{Connector, MemoryConnector, Transport};
//!
//! # tokio_test_block_on(async {
//! let (connector, mut broker) = MemoryConnector::pair();
//! let mut transport = connector.connect("inproc://broker").await.unwrap();
//! let mut peer = broker.accept().await.unwrap();
//!
//! transport.send(Message::from_frames(["hello"])).await.unwrap();
//! assert_eq!(peer.recv().await, Some(Message::from_frames(["hello"])));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Connector, Transport};
use crate::error::{MdpError, Result};
use crate::protocol::Message;

/// Connector whose links terminate in a [`MemoryBroker`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<MemoryPeer>,
    next_id: Arc<AtomicU64>,
}

impl MemoryConnector {
    /// Create a connector and the broker end that accepts its links.
    pub fn pair() -> (Self, MemoryBroker) {
        let (incoming, accept) = mpsc::unbounded_channel();
        let connector = Self {
            incoming,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (connector, MemoryBroker { accept })
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    async fn connect(&self, address: &str) -> Result<MemoryTransport> {
        let (to_worker, from_broker) = mpsc::unbounded_channel();
        let (to_broker, from_worker) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            address: address.to_string(),
            tx: to_worker,
            rx: from_worker,
        };

        self.incoming.send(peer).map_err(|_| {
            MdpError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("no memory broker is accepting on {}", address),
            ))
        })?;

        Ok(MemoryTransport {
            tx: Some(to_broker),
            rx: from_broker,
        })
    }
}

/// Worker end of an in-process link.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Option<mpsc::UnboundedSender<Message>>,
    rx: mpsc::UnboundedReceiver<Message>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, message: Message) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(MdpError::ConnectionClosed)?;
        tx.send(message).map_err(|_| MdpError::ConnectionClosed)
    }

    async fn recv(&mut self) -> Result<Message> {
        // `UnboundedReceiver::recv` is cancel-safe.
        self.rx.recv().await.ok_or(MdpError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}

/// Accepts links opened through the paired [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryBroker {
    accept: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryBroker {
    /// Wait for the next link. Returns `None` once every connector is gone.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept.recv().await
    }

    /// Take the next link if one is already waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accept.try_recv().ok()
    }
}

/// Broker end of one in-process link.
#[derive(Debug)]
pub struct MemoryPeer {
    id: u64,
    address: String,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl MemoryPeer {
    /// Sequence number of this link, starting at 1 per connector.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Address the worker connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send a message to the worker.
    pub fn send(&self, message: Message) -> Result<()> {
        self.tx.send(message).map_err(|_| MdpError::ConnectionClosed)
    }

    /// Receive the next message from the worker.
    ///
    /// Returns `None` once the worker has released the link and every
    /// message it sent has been drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Take the next message if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Drain every message already waiting.
    pub fn drain(&mut self) -> Vec<Message> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Check if the worker has released its end of the link.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
