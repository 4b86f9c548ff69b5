//! Echo Worker - registers the "echo" service and returns every request as
//! its own reply.
//!
//! This example demonstrates:
//! - Building a worker with custom timings
//! - The reply-then-receive loop
//! - Watching connection events
//! - Shutting down cleanly on Ctrl-C (sends DISCONNECT)
//!
//! # Running
//!
//! ```text
//! RUST_LOG=mdp_worker=debug cargo run --example echo -- tcp://localhost:5555
//! ```

use std::time::Duration;

use mdp_worker::{Worker, WorkerEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mdp_worker=info")),
        )
        .init();

    let broker = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tcp://localhost:5555".to_string());

    let mut worker = Worker::builder(broker, "echo")
        .heartbeat_interval(Duration::from_millis(2500))
        .reconnect_delay(Duration::from_millis(2500))
        .build()?;

    let mut events = worker.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let WorkerEvent::Disconnected { reason } = event {
                tracing::warn!("broker link lost: {}", reason);
            }
        }
    });

    let mut reply = None;
    let mut interrupted = false;
    loop {
        tokio::select! {
            request = worker.receive(reply.take()) => match request? {
                Some(request) => reply = Some(request),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                break;
            }
        }
    }

    if interrupted {
        worker.shutdown().await;
    }
    tracing::info!("echo worker stopped");
    Ok(())
}
