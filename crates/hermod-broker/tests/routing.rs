//! End-to-end exercises of the routing core: registration, dispatch,
//! delivery, eviction, and shutdown, against channel-backed connections.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use hermod_broker::{
    BrokerHandler, DeliveryPump, Frame, InboundSender, Monitor, PeerConnection, PeerRegistry,
    PeerSession, ProcessStateCache, QueueItem, ShutdownCoordinator, ShutdownKind,
};
use hermod_core::schema::refs;
use hermod_core::{CloseCode, PeerMessage, PeerType, Principal, ProcessId, SchemaRegistry};
use hermod_store::{connection::ConnectionConfig, migrations, new_in_memory, DocumentStore};

struct Broker {
    registry: Arc<PeerRegistry>,
    handler: Arc<BrokerHandler>,
    monitor: Monitor,
    inbound: InboundSender,
    store: Arc<DocumentStore>,
    states: Arc<ProcessStateCache>,
    process_id: ProcessId,
}

fn make_broker() -> Broker {
    let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
    migrations::run_migrations(&pool.get().unwrap()).unwrap();
    let store = Arc::new(DocumentStore::new(pool));
    let registry = Arc::new(PeerRegistry::new());
    let states = Arc::new(ProcessStateCache::new());
    let process_id = ProcessId::from("broker_proc");
    let handler = Arc::new(BrokerHandler::new(
        process_id.clone(),
        "broker",
        registry.clone(),
        Arc::new(SchemaRegistry::builtin()),
        store.clone(),
        states.clone(),
    ));
    let (monitor, inbound) = Monitor::new(handler.clone());
    monitor.start().unwrap();
    Broker {
        registry,
        handler,
        monitor,
        inbound,
        store,
        states,
        process_id,
    }
}

/// A registered peer with a live connection, pump, and frame receiver —
/// everything the transport boundary would normally wire up.
struct Peer {
    conn: Arc<PeerConnection>,
    frames: mpsc::UnboundedReceiver<Frame>,
}

impl Peer {
    async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(Duration::from_millis(500), self.frames.recv())
            .await
            .expect("frame within the delivery window")
            .expect("transport channel open")
    }

    async fn next_text(&mut self) -> Value {
        match self.next_frame().await {
            Frame::Text(text) => serde_json::from_str(&text).unwrap(),
            Frame::Close { code, reason } => panic!("unexpected close {code:?}: {reason}"),
        }
    }

    fn send(&self, broker: &Broker, message: PeerMessage) {
        // After a stop the consumer (and receiver) are gone; pushing onto a
        // torn-down queue is a no-op, which is what these tests assert on.
        let _ = broker
            .inbound
            .send(QueueItem::external(self.conn.clone(), message));
    }
}

fn connect(broker: &Broker, address: &str) -> Peer {
    let session = PeerSession::new(
        address,
        Principal::new(format!("user_{address}"), address),
        "127.0.0.1",
        PeerType::Worker,
    );
    broker.registry.create_session(session.clone());
    let (conn, frames) = PeerConnection::new(session.id.clone(), "127.0.0.1");
    let (registered, _evicted) = broker.registry.register_replacing(&conn).unwrap();
    let _ = DeliveryPump::spawn(registered, conn.clone());
    Peer { conn, frames }
}

fn peer_message(source: &str, destination: &str, id: u64) -> PeerMessage {
    let mut msg = PeerMessage::new(refs::MESSAGE);
    msg.source = Some(source.into());
    msg.destination = Some(destination.into());
    msg.message_id = Some(id);
    msg
}

async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[tokio::test]
async fn peer_to_peer_message_is_delivered_verbatim() {
    let broker = make_broker();
    let sender = connect(&broker, "source_peer");
    let mut receiver = connect(&broker, "destination_peer");

    let msg = peer_message("source_peer", "destination_peer", 1)
        .with_field("data", json!({"greeting": "hello"}));
    sender.send(&broker, msg);

    let delivered = receiver.next_text().await;
    assert_eq!(delivered["schemaRef"], refs::MESSAGE);
    assert_eq!(delivered["source"], "source_peer");
    assert_eq!(delivered["destination"], "destination_peer");
    assert_eq!(delivered["messageId"], 1);
    assert_eq!(delivered["data"]["greeting"], "hello");
}

#[tokio::test]
async fn delivery_preserves_submission_order_per_destination() {
    let broker = make_broker();
    let sender = connect(&broker, "source_peer");
    let mut receiver = connect(&broker, "destination_peer");

    for i in 0..20 {
        sender.send(&broker, peer_message("source_peer", "destination_peer", i));
    }
    for i in 0..20 {
        let delivered = receiver.next_text().await;
        assert_eq!(delivered["messageId"], i);
    }
}

#[tokio::test]
async fn unknown_destination_closes_sender_with_unacceptable_data() {
    let broker = make_broker();
    let mut sender = connect(&broker, "source_peer");
    let mut bystander = connect(&broker, "destination_peer");

    sender.send(&broker, peer_message("source_peer", "ghost_peer", 1));

    match sender.next_frame().await {
        Frame::Close { code, reason } => {
            assert_eq!(code, CloseCode::UnacceptableData);
            assert!(reason.contains("ghost_peer"));
        }
        Frame::Text(text) => panic!("expected a close, got {text}"),
    }
    // Nothing was delivered anywhere.
    assert!(bystander.frames.try_recv().is_err());
}

#[tokio::test]
async fn self_addressed_messages_are_never_delivered() {
    let broker = make_broker();
    let sender = connect(&broker, "source_peer");
    let mut bystander = connect(&broker, "destination_peer");

    sender.send(&broker, peer_message("source_peer", "broker", 1));
    // Follow with a normal message to prove the loop is still alive.
    sender.send(&broker, peer_message("source_peer", "destination_peer", 2));

    let delivered = bystander.next_text().await;
    assert_eq!(delivered["messageId"], 2);
    assert!(!sender.conn.is_closed());
}

#[tokio::test]
async fn re_registration_evicts_the_prior_peer() {
    let broker = make_broker();
    let mut first = connect(&broker, "worker_1");
    let second = connect(&broker, "worker_1");

    match first.next_frame().await {
        Frame::Close { code, reason } => {
            assert_eq!(code, CloseCode::UnexpectedCondition);
            assert!(reason.contains("logging in again"));
        }
        Frame::Text(text) => panic!("expected a close, got {text}"),
    }

    // Exactly one registry entry for the address, pointing at the survivor.
    let session = broker.registry.lookup("worker_1").unwrap();
    assert_eq!(session.id, second.conn.session_id);

    // Traffic flows to the surviving peer.
    let sender = connect(&broker, "source_peer");
    let mut second = second;
    sender.send(&broker, peer_message("source_peer", "worker_1", 5));
    assert_eq!(second.next_text().await["messageId"], 5);
}

#[tokio::test]
async fn process_messages_are_persisted_once() {
    let broker = make_broker();
    let sender = connect(&broker, "source_peer");

    let msg = PeerMessage::new(refs::PROCESS_SYSTEM)
        .with_field("_id", json!("proc_1"))
        .with_field("name", json!("Test_process_name"));
    sender.send(&broker, msg);

    wait_for("process document", || {
        broker.store.count_processes().unwrap() == 1
    })
    .await;
    let doc = broker
        .store
        .find_process_by_name("Test_process_name")
        .unwrap()
        .unwrap();
    assert_eq!(doc["_id"], "proc_1");
}

#[tokio::test]
async fn process_state_log_is_persisted_and_cached() {
    let broker = make_broker();
    let sender = connect(&broker, "source_peer");

    let msg = PeerMessage::new(refs::PROCESS_SYSTEM)
        .with_field("_id", json!("proc_2"))
        .with_field("name", json!("Test_process_name"));
    sender.send(&broker, msg);

    let state = PeerMessage::new(refs::LOG_PROCESS_STATE)
        .with_field("processId", json!("proc_2"))
        .with_field("state", json!("running"));
    sender.send(&broker, state);

    wait_for("state cache entry", || broker.states.get("proc_2").is_some()).await;
    assert_eq!(broker.states.len(), 1);
    assert_eq!(broker.states.get("proc_2").unwrap()["state"], "running");
    assert_eq!(broker.store.logs_for_process("proc_2").unwrap().len(), 1);
}

#[tokio::test]
async fn stop_closes_every_registered_peer_exactly_once() {
    let broker = make_broker();
    let mut peers: Vec<Peer> = ["peer_a", "peer_b", "peer_c"]
        .into_iter()
        .map(|address| connect(&broker, address))
        .collect();

    let coordinator = ShutdownCoordinator::new();
    let status = coordinator
        .execute(
            &broker.monitor,
            &broker.handler,
            &broker.store,
            &broker.process_id,
            ShutdownKind::Stop,
            "test shutdown",
            "user_1",
        )
        .await;

    assert_eq!(status, 0);
    assert!(broker.monitor.is_terminated());
    for peer in &mut peers {
        match peer.next_frame().await {
            Frame::Close { code, .. } => assert_eq!(code, CloseCode::ShuttingDown),
            Frame::Text(text) => panic!("expected a close, got {text}"),
        }
        assert!(peer.frames.try_recv().is_err());
    }
}

#[tokio::test]
async fn messages_after_stop_are_not_dispatched() {
    let broker = make_broker();
    let sender = connect(&broker, "source_peer");
    let mut receiver = connect(&broker, "destination_peer");

    broker.monitor.stop("user_1", false).await.unwrap();
    sender.send(&broker, peer_message("source_peer", "destination_peer", 9));

    // The close from shut_down arrives; no message ever does.
    match receiver.next_frame().await {
        Frame::Close { code, .. } => assert_eq!(code, CloseCode::ShuttingDown),
        Frame::Text(text) => panic!("expected a close, got {text}"),
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(receiver.frames.try_recv().is_err());
}
