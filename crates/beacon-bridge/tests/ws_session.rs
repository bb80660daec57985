//! End-to-end tests for observer sessions over a real WebSocket.
//!
//! The server runs on an ephemeral loopback port.  No serial worker is
//! started, so the link stays unavailable and device-bound requests fail.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use beacon_bridge::application::{
    BroadcastHub, ChangeFeed, RequestService, EVENT_QUEUE_CAPACITY,
};
use beacon_bridge::infrastructure::serial::link_manager::{LinkManager, LinkSettings};
use beacon_bridge::infrastructure::serial::mock::MockSerialBackend;
use beacon_bridge::infrastructure::ws_server::serve;
use beacon_bridge::infrastructure::{spawn_hub_pump, SessionContext};
use beacon_core::{TableRange, TableStore};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    addr: SocketAddr,
    hub: Arc<BroadcastHub>,
    running: Arc<AtomicBool>,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

async fn start_server() -> Server {
    let backend = MockSerialBackend::new();
    backend.add_port("/dev/ttyACM0", "ARM mbed Serial Port");
    let manager = Arc::new(LinkManager::new(
        Arc::new(backend),
        LinkSettings {
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(10),
            retry_interval: Duration::from_millis(20),
            device_tokens: vec!["mbed".into()],
        },
        None,
    ));
    let store = Arc::new(TableStore::new(TableRange::new(1, 4).unwrap()));
    let hub = Arc::new(BroadcastHub::new());
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let feed = Arc::new(ChangeFeed::new(store, tx));
    spawn_hub_pump(rx, hub.clone());
    let service = Arc::new(RequestService::new(feed, manager));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(serve(
        listener,
        SessionContext {
            hub: hub.clone(),
            service,
        },
        running.clone(),
    ));

    Server { addr, hub, running }
}

async fn connect(server: &Server) -> Client {
    let (client, _response) = connect_async(format!("ws://{}", server.addr))
        .await
        .unwrap();
    client
}

/// Next text frame parsed as JSON; fails the test after two seconds.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a push")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send(client: &mut Client, request: Value) {
    client
        .send(Message::Text(request.to_string()))
        .await
        .unwrap();
}

/// Connects and consumes the snapshot + serial_status greeting.
async fn connect_greeted(server: &Server) -> Client {
    let mut client = connect(server).await;
    next_json(&mut client).await;
    next_json(&mut client).await;
    client
}

// ── Greeting ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_new_observer_gets_snapshot_then_serial_status() {
    // Arrange
    let server = start_server().await;

    // Act
    let mut client = connect(&server).await;
    let first = next_json(&mut client).await;
    let second = next_json(&mut client).await;

    // Assert
    assert_eq!(first["type"], "snapshot");
    assert_eq!(first["range"], json!({"start": 1, "end": 4}));
    assert_eq!(first["counts"], json!({"green": 4, "orange": 0, "red": 0}));
    assert_eq!(second["type"], "serial_status");
    assert_eq!(second["connected_port"], Value::Null);
    assert_eq!(second["available_ports"][0]["device"], "/dev/ttyACM0");
}

// ── Requests ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_range_is_broadcast_to_every_observer() {
    // Arrange
    let server = start_server().await;
    let mut alice = connect_greeted(&server).await;
    let mut bob = connect_greeted(&server).await;

    // Act
    send(&mut alice, json!({"type": "set_range", "start": 2, "end": 3})).await;

    // Assert
    for client in [&mut alice, &mut bob] {
        let push = next_json(client).await;
        assert_eq!(push["type"], "snapshot");
        assert_eq!(push["range"], json!({"start": 2, "end": 3}));
        assert_eq!(push["tables"].as_array().unwrap().len(), 2);
    }
}

#[tokio::test]
async fn test_invalid_range_is_reported_to_requester() {
    let server = start_server().await;
    let mut client = connect_greeted(&server).await;

    send(&mut client, json!({"type": "set_range", "start": 9, "end": 2})).await;

    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "invalid_range");
}

#[tokio::test]
async fn test_set_table_without_receiver_reports_link_unavailable() {
    let server = start_server().await;
    let mut client = connect_greeted(&server).await;

    send(&mut client, json!({"type": "set_table", "table": 2, "color": "red"})).await;

    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "link_unavailable");

    // The store is untouched.
    send(&mut client, json!({"type": "get_snapshot"})).await;
    let snapshot = next_json(&mut client).await;
    assert_eq!(snapshot["counts"]["red"], 0);
}

#[tokio::test]
async fn test_garbage_request_gets_invalid_request_and_session_survives() {
    let server = start_server().await;
    let mut client = connect_greeted(&server).await;

    client
        .send(Message::Text("{not json".to_string()))
        .await
        .unwrap();
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "invalid_request");

    send(&mut client, json!({"type": "get_serial_status"})).await;
    assert_eq!(next_json(&mut client).await["type"], "serial_status");
}

#[tokio::test]
async fn test_set_port_pushes_status_with_configured_port() {
    let server = start_server().await;
    let mut client = connect_greeted(&server).await;

    send(&mut client, json!({"type": "set_port", "port": "COM7"})).await;

    let push = next_json(&mut client).await;
    assert_eq!(push["type"], "serial_status");
    assert_eq!(push["configured_port"], "COM7");
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_closing_socket_unregisters_observer() {
    // Arrange
    let server = start_server().await;
    let mut client = connect_greeted(&server).await;
    assert_eq!(server.hub.len(), 1);

    // Act
    client.close(None).await.unwrap();

    // Assert
    let mut unregistered = false;
    for _ in 0..200 {
        if server.hub.is_empty() {
            unregistered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(unregistered, "observer must leave the hub after close");
}
