//! Integration tests for mdp-worker.
//!
//! Most tests drive a worker against the in-process transport with tokio's
//! clock paused, so heartbeat and reconnect timings are exact. The socket
//! tests at the end use real TCP and Unix sockets.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::timeout;

use mdp_worker::transport::{
    Connector, MemoryBroker, MemoryConnector, MemoryTransport, StreamTransport, Transport,
};
use mdp_worker::{
    Command, DisconnectReason, MdpError, Message, Worker, WorkerBuilder, WorkerEvent,
};

const BROKER: &str = "inproc://broker";
const HEARTBEAT: Duration = Duration::from_millis(100);
const RECONNECT: Duration = Duration::from_millis(10);

fn frames(parts: &[&'static [u8]]) -> Message {
    Message::from_frames(parts.iter().copied())
}

fn ready() -> Message {
    frames(&[b"", b"MDPW01", &[1], b"echo"])
}

fn heartbeat() -> Message {
    frames(&[b"", b"MDPW01", &[4]])
}

fn kill() -> Message {
    frames(&[b"", b"MDPW01", &[6]])
}

fn memory_worker(reconnect_delay: Duration) -> (Worker<MemoryConnector>, MemoryBroker) {
    let (connector, broker) = MemoryConnector::pair();
    let worker = WorkerBuilder::new(BROKER, "echo")
        .heartbeat_interval(HEARTBEAT)
        .reconnect_delay(reconnect_delay)
        .connector(connector)
        .build()
        .unwrap();
    (worker, broker)
}

fn drain_events(events: &mut broadcast::Receiver<WorkerEvent>) -> Vec<WorkerEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_ping_pong() {
    let (mut worker, mut broker) = memory_worker(RECONNECT);

    let broker_task = tokio::spawn(async move {
        let mut peer = broker.accept().await.unwrap();
        assert_eq!(peer.recv().await.unwrap(), ready());

        peer.send(frames(&[b"", b"MDPW01", &[2], b"A", b"", b"ping"]))
            .unwrap();
        assert_eq!(
            peer.recv().await.unwrap(),
            frames(&[b"", b"MDPW01", &[3], b"A", b"", b"pong"])
        );

        peer.send(kill()).unwrap();
        peer
    });

    let request = worker.receive(None).await.unwrap().unwrap();
    assert_eq!(request, Message::from_frames(["ping"]));
    assert!(worker.has_pending_reply());

    let next = worker
        .receive(Some(Message::from_frames(["pong"])))
        .await
        .unwrap();
    assert!(next.is_none());
    assert!(!worker.has_pending_reply());

    let mut peer = broker_task.await.unwrap();
    assert!(peer.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_multi_hop_return_address_round_trips() {
    let (mut worker, mut broker) = memory_worker(RECONNECT);
    worker.connect().await;
    let mut peer = broker.accept().await.unwrap();
    peer.recv().await.unwrap();

    peer.send(frames(&[b"", b"MDPW01", &[2], b"client", b"proxy", b"", b"a", b"b"]))
        .unwrap();
    let request = worker.receive(None).await.unwrap().unwrap();
    assert_eq!(request, Message::from_frames(["a", "b"]));

    peer.send(kill()).unwrap();
    assert!(worker.receive(Some(request)).await.unwrap().is_none());
    assert_eq!(
        peer.recv().await.unwrap(),
        frames(&[b"", b"MDPW01", &[3], b"client", b"proxy", b"", b"a", b"b"])
    );
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_then_reconnect_on_silence() {
    let (mut worker, mut broker) = memory_worker(RECONNECT);

    // 350ms of broker silence at a 100ms interval: heartbeats at 100, 200
    // and 300, liveness runs out at 300, reconnect at 310.
    let result = timeout(Duration::from_millis(350), worker.receive(None)).await;
    assert!(result.is_err());

    let mut first = broker.try_accept().unwrap();
    assert_eq!(
        first.drain(),
        vec![ready(), heartbeat(), heartbeat(), heartbeat()]
    );
    assert!(first.is_closed());

    let mut second = broker.try_accept().unwrap();
    assert_eq!(second.drain(), vec![ready()]);
    assert!(!second.is_closed());
    assert!(broker.try_accept().is_none());

    assert_eq!(worker.generation(), 2);
    assert_eq!(worker.liveness(), Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_chatty_broker_does_not_suppress_heartbeats() {
    let (mut worker, mut broker) = memory_worker(RECONNECT);
    worker.connect().await;
    let peer = broker.accept().await.unwrap();

    // The broker talks every 60ms, so no poll ever runs idle.
    let broker_task = tokio::spawn(async move {
        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            peer.send(heartbeat()).unwrap();
        }
        peer
    });

    let result = timeout(Duration::from_millis(350), worker.receive(None)).await;
    assert!(result.is_err());

    let mut peer = broker_task.await.unwrap();
    let sent = peer.drain();
    assert_eq!(sent[0], ready());
    // Deadlines at 100, 200 and 300 are met on the next inbound message.
    let heartbeats = sent.iter().filter(|message| **message == heartbeat()).count();
    assert_eq!(heartbeats, 3);

    assert_eq!(worker.generation(), 1);
    assert_eq!(worker.liveness(), Some(3));
    assert!(broker.try_accept().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_liveness_counts_down_and_resets_on_traffic() {
    let (mut worker, mut broker) = memory_worker(RECONNECT);
    let mut events = worker.subscribe();

    let result = timeout(Duration::from_millis(250), worker.receive(None)).await;
    assert!(result.is_err());
    assert_eq!(worker.liveness(), Some(1));

    let idle: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter(|event| matches!(event, WorkerEvent::Idle { .. }))
        .collect();
    assert_eq!(
        idle,
        vec![
            WorkerEvent::Idle { liveness: 2 },
            WorkerEvent::Idle { liveness: 1 }
        ]
    );

    // Any inbound message restores full liveness.
    let peer = broker.try_accept().unwrap();
    peer.send(heartbeat()).unwrap();
    let result = timeout(Duration::from_millis(10), worker.receive(None)).await;
    assert!(result.is_err());
    assert_eq!(worker.liveness(), Some(3));
    assert_eq!(worker.generation(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_broker_disconnect_reconnects_without_delay() {
    let (mut worker, mut broker) = memory_worker(Duration::from_secs(5));
    let mut events = worker.subscribe();
    worker.connect().await;

    let mut first = broker.accept().await.unwrap();
    assert_eq!(first.recv().await.unwrap(), ready());
    first.send(frames(&[b"", b"MDPW01", &[5]])).unwrap();

    let result = timeout(Duration::from_millis(50), worker.receive(None)).await;
    assert!(result.is_err());

    assert!(first.is_closed());
    let mut second = broker.try_accept().unwrap();
    assert_eq!(second.drain(), vec![ready()]);
    assert!(broker.try_accept().is_none());
    assert_eq!(worker.generation(), 2);

    assert!(drain_events(&mut events).contains(&WorkerEvent::Disconnected {
        reason: DisconnectReason::BrokerRequested
    }));

    second.send(kill()).unwrap();
    assert!(worker.receive(None).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_kill_stops_worker() {
    let (mut worker, mut broker) = memory_worker(RECONNECT);
    let mut events = worker.subscribe();
    worker.connect().await;
    let mut peer = broker.accept().await.unwrap();
    peer.send(kill()).unwrap();

    assert!(worker.receive(None).await.unwrap().is_none());
    assert!(worker.is_terminated());
    assert!(!worker.is_connected());

    // Only READY was ever sent: no heartbeat and no DISCONNECT after KILL.
    assert_eq!(peer.drain(), vec![ready()]);
    assert!(peer.is_closed());

    let events = drain_events(&mut events);
    assert_eq!(events.last(), Some(&WorkerEvent::Killed));

    // Stays stopped without touching the broker again.
    assert!(worker.receive(None).await.unwrap().is_none());
    assert!(worker
        .receive(Some(Message::from_frames(["late"])))
        .await
        .unwrap()
        .is_none());
    assert!(broker.try_accept().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reply_without_pending_request() {
    let (mut worker, mut broker) = memory_worker(RECONNECT);
    worker.connect().await;
    let mut peer = broker.accept().await.unwrap();

    let err = worker
        .receive(Some(Message::from_frames(["orphan"])))
        .await
        .unwrap_err();
    assert!(matches!(err, MdpError::Protocol(_)));

    assert_eq!(peer.drain(), vec![ready()]);
    assert!(worker.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_messages_are_protocol_errors() {
    let (mut worker, mut broker) = memory_worker(RECONNECT);
    let mut events = worker.subscribe();
    worker.connect().await;
    let peer = broker.accept().await.unwrap();

    let malformed = [
        frames(&[b"", b"MDPW01"]),
        frames(&[b"x", b"MDPW01", &[2]]),
        frames(&[b"", b"MDPW02", &[2]]),
        frames(&[b"", b"MDPW01", &[2, 2]]),
        frames(&[b"", b"MDPW01", &[2], b"A", b"body"]),
        frames(&[b"", b"MDPW01", &[2], b"", b"body"]),
    ];

    for message in malformed {
        // One idle interval first, so the reset below is observable.
        let result = timeout(HEARTBEAT + RECONNECT, worker.receive(None)).await;
        assert!(result.is_err());
        assert_eq!(worker.liveness(), Some(2));

        peer.send(message.clone()).unwrap();
        let err = worker.receive(None).await.unwrap_err();
        assert!(
            matches!(err, MdpError::Protocol(_)),
            "{:?} should be a protocol error, got {:?}",
            message,
            err
        );
        assert!(!worker.has_pending_reply());
        assert_eq!(worker.liveness(), Some(3));
    }

    // The link survives protocol errors.
    assert!(worker.is_connected());
    assert_eq!(worker.generation(), 1);
    let violations = drain_events(&mut events)
        .into_iter()
        .filter(|event| matches!(event, WorkerEvent::ProtocolViolation { .. }))
        .count();
    assert_eq!(violations, 6);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_commands_are_dropped() {
    let (mut worker, mut broker) = memory_worker(RECONNECT);
    let mut events = worker.subscribe();
    worker.connect().await;
    let peer = broker.accept().await.unwrap();

    peer.send(frames(&[b"", b"MDPW01", &[0x07]])).unwrap();
    peer.send(frames(&[b"", b"MDPW01", &[1], b"echo"])).unwrap();
    peer.send(frames(&[b"", b"MDPW01", &[2], b"A", b"", b"hi"]))
        .unwrap();

    let request = worker.receive(None).await.unwrap().unwrap();
    assert_eq!(request, Message::from_frames(["hi"]));

    let unknown: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter(|event| matches!(event, WorkerEvent::UnknownCommand { .. }))
        .collect();
    assert_eq!(
        unknown,
        vec![
            WorkerEvent::UnknownCommand { code: 0x07 },
            WorkerEvent::UnknownCommand { code: 0x01 }
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_reconnects() {
    let (mut worker, mut broker) = memory_worker(RECONNECT);
    let mut events = worker.subscribe();
    worker.connect().await;
    drop(broker.accept().await.unwrap());

    let result = timeout(Duration::from_millis(50), worker.receive(None)).await;
    assert!(result.is_err());

    let mut second = broker.try_accept().unwrap();
    assert_eq!(second.drain(), vec![ready()]);
    assert_eq!(worker.generation(), 2);

    let disconnects: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            WorkerEvent::Disconnected { reason } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(disconnects.len(), 1);
    assert!(matches!(
        disconnects[0],
        DisconnectReason::TransportFailure(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_pending_reply_survives_reconnect() {
    let (mut worker, mut broker) = memory_worker(RECONNECT);
    worker.connect().await;
    let first = broker.accept().await.unwrap();
    first
        .send(frames(&[b"", b"MDPW01", &[2], b"A", b"", b"ping"]))
        .unwrap();
    worker.receive(None).await.unwrap().unwrap();

    worker.connect().await;
    assert!(worker.has_pending_reply());
    assert!(first.is_closed());

    let mut second = broker.try_accept().unwrap();
    second.send(kill()).unwrap();
    assert!(worker
        .receive(Some(Message::from_frames(["pong"])))
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        second.drain(),
        vec![ready(), frames(&[b"", b"MDPW01", &[3], b"A", b"", b"pong"])]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reply_on_dead_link_reconnects() {
    let (mut worker, mut broker) = memory_worker(RECONNECT);
    worker.connect().await;
    let first = broker.accept().await.unwrap();
    first
        .send(frames(&[b"", b"MDPW01", &[2], b"A", b"", b"ping"]))
        .unwrap();
    worker.receive(None).await.unwrap().unwrap();
    drop(first);

    // The send on the dead link fails; the worker reconnects and waits.
    let result = timeout(
        Duration::from_millis(50),
        worker.receive(Some(Message::from_frames(["pong"]))),
    )
    .await;
    assert!(result.is_err());
    assert!(!worker.has_pending_reply());
    assert_eq!(worker.generation(), 2);

    let mut second = broker.try_accept().unwrap();
    assert_eq!(second.drain(), vec![ready()]);
}

/// Links whose HEARTBEAT sends fail while `fail_heartbeats` is set.
struct HeartbeatFailingTransport {
    inner: MemoryTransport,
    fail_heartbeats: bool,
}

#[async_trait]
impl Transport for HeartbeatFailingTransport {
    async fn send(&mut self, message: Message) -> mdp_worker::Result<()> {
        if self.fail_heartbeats && message == heartbeat() {
            return Err(MdpError::ConnectionClosed);
        }
        self.inner.send(message).await
    }

    async fn recv(&mut self) -> mdp_worker::Result<Message> {
        self.inner.recv().await
    }

    async fn close(&mut self) -> mdp_worker::Result<()> {
        self.inner.close().await
    }
}

/// Hands out one link with failing heartbeats, then healthy links.
struct HeartbeatFailingConnector {
    inner: MemoryConnector,
    connects: AtomicU32,
}

#[async_trait]
impl Connector for HeartbeatFailingConnector {
    type Transport = HeartbeatFailingTransport;

    async fn connect(&self, address: &str) -> mdp_worker::Result<HeartbeatFailingTransport> {
        let inner = self.inner.connect(address).await?;
        let first = self.connects.fetch_add(1, Ordering::SeqCst) == 0;
        Ok(HeartbeatFailingTransport {
            inner,
            fail_heartbeats: first,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_heartbeat_reconnects_with_full_liveness() {
    let (inner, mut broker) = MemoryConnector::pair();
    let connector = HeartbeatFailingConnector {
        inner,
        connects: AtomicU32::new(0),
    };
    let mut worker = WorkerBuilder::new(BROKER, "echo")
        .heartbeat_interval(HEARTBEAT)
        .reconnect_delay(RECONNECT)
        .connector(connector)
        .build()
        .unwrap();
    let mut events = worker.subscribe();

    // Heartbeat send fails at 100, reconnect at 110, still polling at 150.
    let result = timeout(Duration::from_millis(150), worker.receive(None)).await;
    assert!(result.is_err());

    assert_eq!(worker.generation(), 2);
    assert_eq!(worker.liveness(), Some(3));
    let idle = drain_events(&mut events)
        .into_iter()
        .filter(|event| matches!(event, WorkerEvent::Idle { .. }))
        .count();
    assert_eq!(idle, 0);

    let first = broker.try_accept().unwrap();
    assert!(first.is_closed());
    let mut second = broker.try_accept().unwrap();
    assert_eq!(second.drain(), vec![ready()]);
}

/// Refuses the first `failures` connection attempts.
struct FlakyConnector {
    inner: MemoryConnector,
    failures: AtomicU32,
}

#[async_trait]
impl Connector for FlakyConnector {
    type Transport = MemoryTransport;

    async fn connect(&self, address: &str) -> mdp_worker::Result<MemoryTransport> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(MdpError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )));
        }
        self.inner.connect(address).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_retries_until_broker_accepts() {
    let (inner, mut broker) = MemoryConnector::pair();
    let connector = FlakyConnector {
        inner,
        failures: AtomicU32::new(2),
    };
    let mut worker = WorkerBuilder::new(BROKER, "echo")
        .heartbeat_interval(HEARTBEAT)
        .reconnect_delay(RECONNECT)
        .connector(connector)
        .build()
        .unwrap();
    let mut events = worker.subscribe();

    let started = tokio::time::Instant::now();
    worker.connect().await;
    assert!(started.elapsed() >= RECONNECT * 2);
    assert!(started.elapsed() < RECONNECT * 3);
    assert_eq!(worker.generation(), 1);

    let events = drain_events(&mut events);
    let failed = events
        .iter()
        .filter(|event| matches!(event, WorkerEvent::ConnectFailed { .. }))
        .count();
    assert_eq!(failed, 2);
    assert!(events.contains(&WorkerEvent::Connected {
        broker: BROKER.to_string(),
        generation: 1
    }));

    let mut peer = broker.try_accept().unwrap();
    assert_eq!(peer.drain(), vec![ready()]);
}

#[tokio::test(start_paused = true)]
async fn test_connect_event_sequence() {
    let (mut worker, _broker) = memory_worker(RECONNECT);
    let mut events = worker.subscribe();
    worker.connect().await;

    assert_eq!(
        drain_events(&mut events),
        vec![
            WorkerEvent::Connecting {
                broker: BROKER.to_string()
            },
            WorkerEvent::Sent {
                command: Command::Ready
            },
            WorkerEvent::Connected {
                broker: BROKER.to_string(),
                generation: 1
            },
        ]
    );
}

#[test]
fn test_invalid_construction() {
    assert!(matches!(
        Worker::new("", "echo"),
        Err(MdpError::InvalidArgument(_))
    ));
    assert!(matches!(
        Worker::new("tcp://localhost:5555", "  "),
        Err(MdpError::InvalidArgument(_))
    ));
    assert!(matches!(
        Worker::new("tcp://localhost", "echo"),
        Err(MdpError::InvalidArgument(_))
    ));
}

#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
struct Job {
    id: u32,
    input: String,
}

/// Worker against a minimal broker on a real TCP socket.
#[tokio::test]
async fn test_tcp_round_trip_with_msgpack_body() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("tcp://{}", listener.local_addr().unwrap());

    let broker_task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut link = StreamTransport::new(stream);
        assert_eq!(link.recv().await.unwrap(), ready());

        let job = Message::from_msgpack(&Job {
            id: 7,
            input: "hello".into(),
        })
        .unwrap();
        let mut request = frames(&[b"", b"MDPW01", &[2], b"client-1", b""]);
        for frame in job {
            request.push_back(frame);
        }
        link.send(request).await.unwrap();

        let reply = link.recv().await.unwrap();
        link.send(kill()).await.unwrap();
        reply
    });

    let mut worker = Worker::builder(address, "echo")
        .heartbeat_interval(Duration::from_secs(1))
        .build()
        .unwrap();

    let request = worker.receive(None).await.unwrap().unwrap();
    let job: Job = request.decode_frame(0).unwrap();
    assert_eq!(
        job,
        Job {
            id: 7,
            input: "hello".into()
        }
    );

    let reply = Message::from_frames([job.input.to_uppercase()]);
    assert!(worker.receive(Some(reply)).await.unwrap().is_none());

    assert_eq!(
        broker_task.await.unwrap(),
        frames(&[b"", b"MDPW01", &[3], b"client-1", b"", b"HELLO"])
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_ipc_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broker.sock");
    let listener = tokio::net::UnixListener::bind(&path).unwrap();

    let broker_task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut link = StreamTransport::new(stream);
        let ready = link.recv().await.unwrap();
        link.send(kill()).await.unwrap();
        ready
    });

    let mut worker = Worker::new(format!("ipc://{}", path.display()), "echo").unwrap();
    assert!(worker.receive(None).await.unwrap().is_none());
    assert_eq!(broker_task.await.unwrap(), ready());
}
