//! Multipart transport over any async byte stream.
//!
//! Frames messages with the 5-byte header from [`crate::wire`] and decodes
//! inbound bytes with a [`MessageBuffer`]. Reads go through a persistent
//! buffer so that a `recv` cancelled by the poll timeout never drops bytes.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::Transport;
use crate::error::{MdpError, Result};
use crate::protocol::Message;
use crate::wire::{encode_message, MessageBuffer, DEFAULT_MAX_FRAME_SIZE};

/// Read chunk size for socket reads.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// [`Transport`] over an `AsyncRead + AsyncWrite` stream.
pub struct StreamTransport<S> {
    stream: S,
    decoder: MessageBuffer,
    /// Messages decoded but not yet handed out.
    ready: VecDeque<Message>,
    read_buf: Box<[u8]>,
    write_buf: BytesMut,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream with default frame limits.
    pub fn new(stream: S) -> Self {
        Self::with_max_frame_size(stream, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Wrap a connected stream with a custom inbound frame limit.
    pub fn with_max_frame_size(stream: S, max_frame_size: u32) -> Self {
        Self {
            stream,
            decoder: MessageBuffer::with_max_frame_size(max_frame_size),
            ready: VecDeque::new(),
            read_buf: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            write_buf: BytesMut::new(),
        }
    }

    /// Get a reference to the underlying stream.
    pub fn inner(&self) -> &S {
        &self.stream
    }

    /// Unwrap the underlying stream, discarding any buffered input.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: Message) -> Result<()> {
        self.write_buf.clear();
        encode_message(&message, &mut self.write_buf)?;
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Message> {
        loop {
            if let Some(message) = self.ready.pop_front() {
                return Ok(message);
            }

            // `read` is cancel-safe: either it completes with data or no
            // bytes were consumed from the stream.
            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                return Err(MdpError::ConnectionClosed);
            }

            let messages = self.decoder.push(&self.read_buf[..n])?;
            self.ready.extend(messages);
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.ready.clear();
        self.decoder.clear();
        self.stream.shutdown().await?;
        Ok(())
    }
}

impl<S> std::fmt::Debug for StreamTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("decoder", &self.decoder)
            .field("ready", &self.ready.len())
            .finish()
    }
}
