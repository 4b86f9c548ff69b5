//! Worker builder and request loop.
//!
//! The [`Worker`] registers a service with a broker and hands requests to the
//! caller one at a time:
//! 1. Connect and send READY (lazily, on the first `receive`)
//! 2. Send the caller's reply to the previous request, if any
//! 3. Poll the broker link, heartbeating and counting down liveness while idle
//! 4. Return the next request body, or `None` once the broker sends KILL
//!
//! # Example
//!
//! ```ignore
//! use mdp_worker::{Message, Worker};
//!
//! #[tokio::main]
//! async fn main() -> mdp_worker::Result<()> {
//!     let mut worker = Worker::new("tcp://localhost:5555", "echo")?;
//!
//!     let mut reply: Option<Message> = None;
//!     while let Some(request) = worker.receive(reply.take()).await? {
//!         reply = Some(request); // echo
//!     }
//!     Ok(())
//! }
//! ```

mod connection;
mod liveness;

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

use self::connection::{Connection, Poll};
use crate::config::{require_non_blank, require_non_zero, WorkerConfig};
use crate::error::{MdpError, Result};
use crate::event::{DisconnectReason, EventBus, WorkerEvent};
use crate::protocol::{build_envelope, open_envelope, Command, Message, ReturnAddress};
use crate::transport::{Connector, SocketConnector};

/// Builder for configuring and creating a [`Worker`].
pub struct WorkerBuilder<C = SocketConnector> {
    broker: String,
    service: String,
    heartbeat_interval: Duration,
    reconnect_delay: Duration,
    connector: C,
}

impl WorkerBuilder<SocketConnector> {
    /// Create a builder for `service` on the broker at `broker`, using the
    /// socket connector.
    pub fn new(broker: impl Into<String>, service: impl Into<String>) -> Self {
        let config = WorkerConfig::new(broker, service);
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            reconnect_delay: config.reconnect_delay(),
            broker: config.broker,
            service: config.service,
            connector: SocketConnector::new(),
        }
    }

    /// Create a builder from a config, including the socket frame limit.
    pub fn from_config(config: WorkerConfig) -> Self {
        let connector = SocketConnector::new().with_max_frame_size(config.max_frame_size);
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            reconnect_delay: config.reconnect_delay(),
            broker: config.broker,
            service: config.service,
            connector,
        }
    }
}

impl<C: Connector> WorkerBuilder<C> {
    /// Set the heartbeat interval, which is also the poll timeout.
    ///
    /// Default: 2500ms
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the delay before each reconnect attempt.
    ///
    /// Default: 2500ms
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Use a different transport connector.
    pub fn connector<D: Connector>(self, connector: D) -> WorkerBuilder<D> {
        WorkerBuilder {
            broker: self.broker,
            service: self.service,
            heartbeat_interval: self.heartbeat_interval,
            reconnect_delay: self.reconnect_delay,
            connector,
        }
    }

    /// Validate the settings and build the worker. Does not connect.
    ///
    /// # Errors
    ///
    /// [`MdpError::InvalidArgument`] for a blank broker address or service
    /// name, an address the connector cannot parse, or a zero interval.
    pub fn build(self) -> Result<Worker<C>> {
        require_non_blank("broker address", &self.broker)?;
        require_non_blank("service name", &self.service)?;
        require_non_zero("heartbeat interval", self.heartbeat_interval)?;
        require_non_zero("reconnect delay", self.reconnect_delay)?;
        self.connector.check_address(&self.broker)?;

        Ok(Worker {
            broker: self.broker,
            service: self.service,
            heartbeat_interval: self.heartbeat_interval,
            reconnect_delay: self.reconnect_delay,
            connector: self.connector,
            connection: None,
            reply_to: None,
            generation: 0,
            terminated: false,
            events: EventBus::new(),
        })
    }
}

/// A Majordomo worker bound to one service on one broker.
///
/// All state is owned by the worker and only touched through `&mut self`, so
/// no locking is involved. Dropping the worker (or an in-flight `receive`
/// future) releases the broker link.
pub struct Worker<C: Connector = SocketConnector> {
    broker: String,
    service: String,
    heartbeat_interval: Duration,
    reconnect_delay: Duration,
    connector: C,
    /// Live link, replaced wholesale on reconnect.
    connection: Option<Connection<C::Transport>>,
    /// Return address of the request awaiting a reply.
    reply_to: Option<ReturnAddress>,
    /// Successful connects so far.
    generation: u64,
    /// Set by KILL or `shutdown`.
    terminated: bool,
    events: EventBus,
}

impl Worker<SocketConnector> {
    /// Create a worker using the socket connector and default timings.
    ///
    /// # Errors
    ///
    /// [`MdpError::InvalidArgument`] if either argument is blank or the
    /// address is not a `tcp://` or `ipc://` endpoint.
    pub fn new(broker: impl Into<String>, service: impl Into<String>) -> Result<Self> {
        WorkerBuilder::new(broker, service).build()
    }

    /// Create a worker from a [`WorkerConfig`].
    pub fn from_config(config: WorkerConfig) -> Result<Self> {
        config.validate()?;
        WorkerBuilder::from_config(config).build()
    }

    /// Create a new worker builder.
    pub fn builder(
        broker: impl Into<String>,
        service: impl Into<String>,
    ) -> WorkerBuilder<SocketConnector> {
        WorkerBuilder::new(broker, service)
    }
}

impl<C: Connector> Worker<C> {
    /// Broker address.
    pub fn broker(&self) -> &str {
        &self.broker
    }

    /// Service name announced in READY.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Heartbeat interval (also the poll timeout).
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Change the heartbeat interval. Applies from the next poll; the
    /// current heartbeat deadline is kept.
    pub fn set_heartbeat_interval(&mut self, interval: Duration) -> Result<()> {
        require_non_zero("heartbeat interval", interval)?;
        self.heartbeat_interval = interval;
        Ok(())
    }

    /// Delay before each reconnect attempt.
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Change the reconnect delay.
    pub fn set_reconnect_delay(&mut self, delay: Duration) -> Result<()> {
        require_non_zero("reconnect delay", delay)?;
        self.reconnect_delay = delay;
        Ok(())
    }

    /// Subscribe to diagnostic events.
    ///
    /// Returns a receiver that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Liveness left on the current link, or `None` when not connected.
    pub fn liveness(&self) -> Option<u32> {
        self.connection.as_ref().map(Connection::liveness)
    }

    /// Check if a broker link is currently held.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Check if the worker was stopped by KILL or `shutdown`.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Check if a request is waiting for its reply.
    pub fn has_pending_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// Number of successful connects so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the next request, sending `reply` for the previous one first.
    ///
    /// Pass `None` on the first call and whenever there is nothing to answer.
    /// Returns `Ok(None)` once the broker has sent KILL; the link is released
    /// by then and every later call returns `Ok(None)` without I/O.
    ///
    /// Transport failures and broker silence are handled internally by
    /// reconnecting and are never returned.
    ///
    /// # Errors
    ///
    /// [`MdpError::Protocol`] if a reply is given with no request pending
    /// (nothing is sent), or if the broker sends a malformed message.
    pub async fn receive(&mut self, reply: Option<Message>) -> Result<Option<Message>> {
        if self.terminated {
            tracing::debug!("receive() called on a terminated worker");
            return Ok(None);
        }

        let reply = match reply {
            Some(body) => {
                let Some(address) = self.reply_to.take() else {
                    let err = MdpError::protocol("malformed reply: no request is pending");
                    return Err(self.report_violation(err));
                };
                let mut message = body;
                message.push_address(address);
                Some(message)
            }
            None => None,
        };

        if self.connection.is_none() {
            self.connect().await;
        }

        if let Some(message) = reply {
            if let Err(err) = self.send_to_broker(Command::Reply, None, Some(message)).await {
                self.recover(err).await;
            }
        }

        self.wait_for_request().await
    }

    /// Tear down any current link, open a fresh one and send READY.
    ///
    /// Retries every `reconnect_delay` until it succeeds; there is no retry
    /// budget.
    pub async fn connect(&mut self) {
        self.release().await;

        loop {
            self.events.emit(WorkerEvent::Connecting {
                broker: self.broker.clone(),
            });
            tracing::debug!("Connecting to broker at {}", self.broker);

            match self.try_connect().await {
                Ok(()) => {
                    tracing::info!(
                        "Connected to broker at {} (generation {})",
                        self.broker,
                        self.generation
                    );
                    self.events.emit(WorkerEvent::Connected {
                        broker: self.broker.clone(),
                        generation: self.generation,
                    });
                    return;
                }
                Err(err) => {
                    self.release().await;
                    tracing::warn!(
                        "Cannot connect to broker at {}: {} - retrying in {:?}",
                        self.broker,
                        err,
                        self.reconnect_delay
                    );
                    self.events.emit(WorkerEvent::ConnectFailed {
                        broker: self.broker.clone(),
                        error: err.to_string(),
                    });
                    sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    /// Release the broker link without notifying the broker.
    ///
    /// The worker stays usable: the next `receive` reconnects.
    pub async fn close(&mut self) {
        if self.connection.is_some() {
            self.release().await;
            tracing::debug!("Broker link to {} closed", self.broker);
            self.events.emit(WorkerEvent::Closed);
        }
    }

    /// Stop the worker: send DISCONNECT if connected, release the link and
    /// refuse further work.
    pub async fn shutdown(&mut self) {
        if self.connection.is_some() && !self.terminated {
            if let Err(err) = self.send_to_broker(Command::Disconnect, None, None).await {
                tracing::debug!("Could not send DISCONNECT during shutdown: {}", err);
            }
        }
        self.terminated = true;
        self.reply_to = None;
        self.close().await;
    }

    async fn try_connect(&mut self) -> Result<()> {
        let transport = self.connector.connect(&self.broker).await?;
        self.generation += 1;
        self.connection = Some(Connection::open(
            transport,
            self.heartbeat_interval,
            self.generation,
        ));

        let service = Bytes::from(self.service.clone());
        self.send_to_broker(Command::Ready, Some(service), None).await
    }

    async fn wait_for_request(&mut self) -> Result<Option<Message>> {
        loop {
            if self.terminated {
                tracing::info!("Worker for {:?} killed by broker", self.service);
                self.release().await;
                self.events.emit(WorkerEvent::Killed);
                return Ok(None);
            }

            let interval = self.heartbeat_interval;
            let Some(connection) = self.connection.as_mut() else {
                self.connect().await;
                continue;
            };

            match connection.poll(interval).await {
                Poll::Message(message) => {
                    if let Some(request) = self.dispatch(message).await? {
                        return Ok(Some(request));
                    }
                    if !self.terminated {
                        self.heartbeat_if_due().await;
                    }
                }
                Poll::Idle => {
                    // A failed heartbeat already rebuilt the link at full liveness.
                    if self.heartbeat_if_due().await {
                        self.record_idle().await;
                    }
                }
                Poll::Failed(err) => self.recover(err).await,
            }
        }
    }

    /// Interpret one inbound message. Returns the request body for REQUEST.
    async fn dispatch(&mut self, message: Message) -> Result<Option<Message>> {
        tracing::debug!("Received message from broker: {} frames", message.len());

        let envelope = match open_envelope(message) {
            Ok(envelope) => envelope,
            Err(err) => return Err(self.report_violation(err)),
        };

        let Some(command) = envelope.command() else {
            return Ok(self.drop_unknown(envelope.code));
        };

        match command {
            Command::Request => {
                let mut body = envelope.body;
                let address = match body.pop_address() {
                    Ok(address) => address,
                    Err(err) => return Err(self.report_violation(err)),
                };
                self.events.emit(WorkerEvent::Received { command });
                self.reply_to = Some(address);
                Ok(Some(body))
            }
            Command::Heartbeat => {
                self.events.emit(WorkerEvent::Received { command });
                Ok(None)
            }
            Command::Disconnect => {
                self.events.emit(WorkerEvent::Received { command });
                tracing::info!("Broker at {} requested disconnect - reconnecting", self.broker);
                self.events.emit(WorkerEvent::Disconnected {
                    reason: DisconnectReason::BrokerRequested,
                });
                self.connect().await;
                Ok(None)
            }
            Command::Kill => {
                self.events.emit(WorkerEvent::Received { command });
                self.terminated = true;
                Ok(None)
            }
            Command::Ready | Command::Reply => Ok(self.drop_unknown(command.code())),
        }
    }

    fn drop_unknown(&self, code: u8) -> Option<Message> {
        tracing::error!("Invalid input message from broker: command {:#04x}", code);
        self.events.emit(WorkerEvent::UnknownCommand { code });
        None
    }

    /// Log and publish a protocol error, handing it back for the caller.
    fn report_violation(&self, err: MdpError) -> MdpError {
        tracing::error!("{}", err);
        self.events.emit(WorkerEvent::ProtocolViolation {
            message: err.to_string(),
        });
        err
    }

    /// Send HEARTBEAT if the deadline has passed.
    ///
    /// Returns `false` if the send failed and the link was replaced.
    async fn heartbeat_if_due(&mut self) -> bool {
        let now = Instant::now();
        let due = self
            .connection
            .as_ref()
            .is_some_and(|connection| connection.heartbeat_due(now));
        if !due {
            return true;
        }

        if let Err(err) = self.send_to_broker(Command::Heartbeat, None, None).await {
            self.recover(err).await;
            return false;
        }

        let interval = self.heartbeat_interval;
        if let Some(connection) = self.connection.as_mut() {
            connection.schedule_next_heartbeat(now, interval);
        }
        true
    }

    async fn record_idle(&mut self) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let liveness = connection.record_idle();
        self.events.emit(WorkerEvent::Idle { liveness });

        if connection.is_exhausted() {
            tracing::info!(
                "Disconnected from broker at {} (generation {}) - retrying in {:?}",
                self.broker,
                connection.generation(),
                self.reconnect_delay
            );
            self.events.emit(WorkerEvent::Disconnected {
                reason: DisconnectReason::LivenessExhausted,
            });
            self.release().await;
            sleep(self.reconnect_delay).await;
            self.connect().await;
        }
    }

    /// Handle a transport failure: tear down, wait, reconnect.
    async fn recover(&mut self, err: MdpError) {
        tracing::warn!(
            "Broker link to {} failed: {} - reconnecting in {:?}",
            self.broker,
            err,
            self.reconnect_delay
        );
        self.events.emit(WorkerEvent::Disconnected {
            reason: DisconnectReason::TransportFailure(err.to_string()),
        });
        self.release().await;
        sleep(self.reconnect_delay).await;
        self.connect().await;
    }

    async fn send_to_broker(
        &mut self,
        command: Command,
        data: Option<Bytes>,
        base: Option<Message>,
    ) -> Result<()> {
        let connection = self.connection.as_mut().ok_or(MdpError::ConnectionClosed)?;
        let message = build_envelope(command, data, base);

        tracing::debug!("Sending {} to broker: {} frames", command, message.len());
        connection.send(message).await?;
        self.events.emit(WorkerEvent::Sent { command });
        Ok(())
    }

    async fn release(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
    }
}

impl<C: Connector> std::fmt::Debug for Worker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("broker", &self.broker)
            .field("service", &self.service())
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("connected", &self.is_connected())
            .field("liveness", &self.liveness())
            .field("generation", &self.generation)
            .field("pending_reply", &self.has_pending_reply())
            .field("terminated", &self.terminated)
            .finish()
    }
}
