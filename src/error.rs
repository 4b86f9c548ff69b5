//! Error types for mdp-worker.

use thiserror::Error;

/// Main error type for all worker operations.
#[derive(Debug, Error)]
pub enum MdpError {
    /// Invalid constructor or configuration argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Protocol error (malformed envelope, reply without a pending request, bad framing).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection closed by the peer.
    #[error("Connection closed")]
    ConnectionClosed,

    /// JSON error (configuration only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

impl MdpError {
    /// Shorthand for building a [`MdpError::Protocol`].
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Shorthand for building a [`MdpError::InvalidArgument`].
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Result type alias using MdpError.
pub type Result<T> = std::result::Result<T, MdpError>;
