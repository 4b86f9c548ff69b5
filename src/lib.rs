//! # mdp-worker
//!
//! Worker side of the Majordomo Protocol (MDP/Worker, `MDPW01`).
//!
//! A worker registers one service with a broker, then loops: hand the reply
//! for the previous request to [`Worker::receive`], get the next request
//! back. Heartbeating, broker liveness tracking and reconnection all happen
//! inside that call.
//!
//! ## Architecture
//!
//! - **Protocol**: multi-frame messages and the `"" MDPW01 <command>` envelope
//! - **Transport**: a [`transport::Connector`]/[`transport::Transport`] seam;
//!   stream sockets (`tcp://`, `ipc://`) with length-prefixed frames, and an
//!   in-process transport for tests
//! - **Worker**: the request loop with heartbeat and liveness state per link
//!
//! ## Example
//!
//! ```ignore
//! use mdp_worker::Worker;
//!
//! #[tokio::main]
//! async fn main() -> mdp_worker::Result<()> {
//!     let mut worker = Worker::new("tcp://localhost:5555", "echo")?;
//!
//!     let mut reply = None;
//!     while let Some(request) = worker.receive(reply.take()).await? {
//!         reply = Some(request);
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod transport;
pub mod wire;

mod worker;

pub use config::WorkerConfig;
pub use error::{MdpError, Result};
pub use event::{DisconnectReason, WorkerEvent};
pub use protocol::{Command, Message};
pub use worker::{Worker, WorkerBuilder};
