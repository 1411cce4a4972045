//! Integration tests for the correlated connection.
//!
//! A scripted TCP server stands in for the agent so that response order
//! and timing are under the test's control.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rxscope_controller::{Connection, ConnectionError};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::time::timeout;

// ============================================================================
// Test Helpers
// ============================================================================

struct Peer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Peer {
    async fn read(&mut self) -> Value {
        let line = timeout(Duration::from_secs(2), self.lines.next_line())
            .await
            .expect("request should arrive in time")
            .unwrap()
            .expect("connection should stay open");
        serde_json::from_str(&line).unwrap()
    }

    async fn write(&mut self, frame: Value) {
        self.writer
            .write_all(format!("{frame}\n").as_bytes())
            .await
            .unwrap();
    }
}

/// Starts a connection against a one-shot listener and returns both ends.
async fn pair() -> (Arc<Connection>, Peer) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let connection = Arc::new(Connection::new(address));
    let (connected, accepted) = tokio::join!(connection.connect(), listener.accept());
    connected.unwrap();

    let (stream, _) = accepted.unwrap();
    let (reader, writer) = stream.into_split();
    let peer = Peer {
        lines: BufReader::new(reader).lines(),
        writer,
    };
    (connection, peer)
}

// ============================================================================
// Correlation Tests
// ============================================================================

#[tokio::test]
async fn test_out_of_order_responses() {
    let (connection, mut peer) = pair().await;

    let a = tokio::spawn({
        let connection = Arc::clone(&connection);
        async move { connection.request("Test", "a", json!({})).await }
    });
    let first = peer.read().await;

    let b = tokio::spawn({
        let connection = Arc::clone(&connection);
        async move { connection.request("Test", "b", json!({})).await }
    });
    let second = peer.read().await;

    assert_eq!(first["method"], "Test.a");
    assert_eq!(second["method"], "Test.b");
    assert!(second["id"].as_u64().unwrap() > first["id"].as_u64().unwrap());

    peer.write(json!({ "id": second["id"], "result": "for b" })).await;
    peer.write(json!({ "id": first["id"], "result": "for a" })).await;

    assert_eq!(b.await.unwrap().unwrap(), json!("for b"));
    assert_eq!(a.await.unwrap().unwrap(), json!("for a"));

    connection.dispose().await;
}

#[tokio::test]
async fn test_error_rejects_only_its_request() {
    let (connection, mut peer) = pair().await;

    let failing = tokio::spawn({
        let connection = Arc::clone(&connection);
        async move { connection.request("Test", "fail", json!({})).await }
    });
    let failing_request = peer.read().await;

    let ok = tokio::spawn({
        let connection = Arc::clone(&connection);
        async move { connection.request("Test", "ok", json!({})).await }
    });
    let ok_request = peer.read().await;

    peer.write(json!({
        "id": failing_request["id"],
        "error": { "code": -32000, "message": "boom" }
    }))
    .await;
    // Unknown ids are ignored.
    peer.write(json!({ "id": 999, "result": null })).await;
    peer.write(json!({ "id": ok_request["id"], "result": { "done": true } }))
        .await;

    match failing.await.unwrap() {
        Err(ConnectionError::Protocol { code, message }) => {
            assert_eq!(code, -32000);
            assert_eq!(message, "boom");
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
    assert_eq!(ok.await.unwrap().unwrap(), json!({ "done": true }));

    connection.dispose().await;
}

#[tokio::test]
async fn test_pending_rejected_when_peer_closes() {
    let (connection, mut peer) = pair().await;

    let pending = tokio::spawn({
        let connection = Arc::clone(&connection);
        async move { connection.request("Test", "never", json!({})).await }
    });
    peer.read().await;
    drop(peer);

    let result = timeout(Duration::from_secs(2), pending)
        .await
        .expect("request should not hang")
        .unwrap();
    assert!(matches!(result, Err(ConnectionError::ConnectionClosed)));
    assert!(!connection.is_open());

    let after = connection.request("Test", "late", json!({})).await;
    assert!(matches!(after, Err(ConnectionError::NotConnected)));
}

#[tokio::test]
async fn test_subscribe_dispatches_events() {
    let (connection, mut peer) = pair().await;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let subscribing = tokio::spawn({
        let connection = Arc::clone(&connection);
        let seen = Arc::clone(&seen);
        async move {
            connection
                .subscribe("Runtime", "bindingCalled", move |params: &Value| {
                    seen.lock().unwrap().push(params.clone());
                })
                .await
        }
    });

    let subscribe = peer.read().await;
    assert_eq!(subscribe["method"], "Agent.subscribe");
    assert_eq!(subscribe["params"]["events"], json!(["Runtime.bindingCalled"]));
    peer.write(json!({ "id": subscribe["id"], "result": {} })).await;
    subscribing.await.unwrap().unwrap();

    peer.write(json!({ "method": "Runtime.bindingCalled", "params": { "name": "x" } }))
        .await;
    peer.write(json!({ "method": "Runtime.other", "params": {} })).await;

    let mut delivered = false;
    for _ in 0..50 {
        if !seen.lock().unwrap().is_empty() {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(delivered, "event should be dispatched");
    assert_eq!(*seen.lock().unwrap(), vec![json!({ "name": "x" })]);

    connection.dispose().await;
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (connection, _peer) = pair().await;
    // A second connect while open must not dial again; the listener is
    // gone, so dialing would fail.
    connection.connect().await.unwrap();
    assert!(connection.is_open());
    connection.dispose().await;
}
