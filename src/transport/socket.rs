//! Socket endpoints and connector.
//!
//! - `tcp://host:port` (or bare `host:port`): TCP with `TCP_NODELAY`
//! - `ipc:///path/to/socket`: Unix Domain Socket (Unix only)
//!
//! # Example
//!
//! ```ignore
//! use mdp_worker::transport::{Connector, SocketConnector};
//!
//! let connector = SocketConnector::new();
//! let transport = connector.connect("tcp://127.0.0.1:5555").await?;
//! ```

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::{Connector, StreamTransport};
use crate::error::{MdpError, Result};
use crate::wire::DEFAULT_MAX_FRAME_SIZE;

/// Byte stream behind a [`SocketTransport`].
pub trait SocketStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> SocketStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Transport produced by [`SocketConnector`].
pub type SocketTransport = StreamTransport<Box<dyn SocketStream>>;

/// A parsed broker endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP `host:port`.
    Tcp(String),
    /// Unix domain socket path.
    Ipc(PathBuf),
}

impl Endpoint {
    /// Parse an endpoint string.
    ///
    /// # Example
    ///
    /// ```
    /// use mdp_worker::transport::Endpoint;
    ///
    /// assert_eq!(
    ///     Endpoint::parse("tcp://localhost:5555").unwrap(),
    ///     Endpoint::Tcp("localhost:5555".to_string())
    /// );
    /// assert!(Endpoint::parse("udp://localhost:5555").is_err());
    /// ```
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();

        if let Some(path) = address.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(MdpError::invalid_argument(format!(
                    "ipc endpoint {:?} has no path",
                    address
                )));
            }
            return Ok(Self::Ipc(PathBuf::from(path)));
        }

        let host_port = match address.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some((scheme, _)) => {
                return Err(MdpError::invalid_argument(format!(
                    "unsupported endpoint scheme {:?} in {:?}",
                    scheme, address
                )))
            }
            None => address,
        };

        match host_port.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Self::Tcp(host_port.to_string()))
            }
            _ => Err(MdpError::invalid_argument(format!(
                "endpoint {:?} is not of the form tcp://host:port",
                address
            ))),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(host_port) => write!(f, "tcp://{}", host_port),
            Self::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}

/// Opens [`SocketTransport`]s for `tcp://` and `ipc://` endpoints.
#[derive(Debug, Clone)]
pub struct SocketConnector {
    max_frame_size: u32,
}

impl SocketConnector {
    /// Create a connector with the default inbound frame limit.
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the maximum accepted inbound frame size.
    pub fn with_max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Maximum accepted inbound frame size.
    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }
}

impl Default for SocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for SocketConnector {
    type Transport = SocketTransport;

    async fn connect(&self, address: &str) -> Result<SocketTransport> {
        let stream: Box<dyn SocketStream> = match Endpoint::parse(address)? {
            Endpoint::Tcp(host_port) => {
                let stream = TcpStream::connect(host_port.as_str()).await?;
                stream.set_nodelay(true)?;
                Box::new(stream)
            }
            Endpoint::Ipc(path) => connect_ipc(path).await?,
        };

        Ok(StreamTransport::with_max_frame_size(
            stream,
            self.max_frame_size,
        ))
    }

    fn check_address(&self, address: &str) -> Result<()> {
        Endpoint::parse(address).map(|_| ())
    }
}

#[cfg(unix)]
async fn connect_ipc(path: PathBuf) -> Result<Box<dyn SocketStream>> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
async fn connect_ipc(path: PathBuf) -> Result<Box<dyn SocketStream>> {
    Err(MdpError::invalid_argument(format!(
        "ipc endpoints are not supported on this platform: {}",
        path.display()
    )))
}
