//! Socket transport: a real local-socket client against the listener task.

use std::sync::Arc;

use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::GenericNamespaced;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use agent_bridge::bridge::agent::EchoAgent;
use agent_bridge::bridge::Bridge;

use super::test_helpers::test_config;

/// The listener accepts a local-socket client and serves the same protocol
/// as stdio: initialize, then a session, visible in the registry.
#[tokio::test]
#[serial_test::serial]
async fn socket_client_round_trip() {
    let socket_name = format!("agent-bridge-test-{}", Uuid::new_v4());
    let bridge = Arc::new(Bridge::new(test_config(2, 2), Arc::new(EchoAgent)));
    let cancel = CancellationToken::new();

    let handle = agent_bridge::transport::socket::spawn_socket_listener(
        Arc::clone(&bridge),
        &socket_name,
        cancel.clone(),
    )
    .expect("listener must start");

    let name = socket_name
        .as_str()
        .to_ns_name::<GenericNamespaced>()
        .expect("valid socket name");
    let stream = Stream::connect(name).await.expect("client connect");
    let (rx, mut tx) = stream.split();
    let mut reader = BufReader::new(rx);

    let mut line = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": { "clientCapabilities": {} },
    })
    .to_string();
    line.push('\n');
    tx.write_all(line.as_bytes()).await.expect("write initialize");

    let mut buf = String::new();
    reader.read_line(&mut buf).await.expect("read response");
    let init: Value = serde_json::from_str(buf.trim()).expect("json frame");
    assert_eq!(init["id"], 1);
    assert!(init["result"]["protocolVersion"].is_number());

    let mut line = json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "session/new",
        "params": {},
    })
    .to_string();
    line.push('\n');
    tx.write_all(line.as_bytes()).await.expect("write session/new");

    buf.clear();
    reader.read_line(&mut buf).await.expect("read response");
    let created: Value = serde_json::from_str(buf.trim()).expect("json frame");
    let session_id = created["result"]["sessionId"].as_str().expect("session id");

    let meta = bridge
        .registry()
        .meta(session_id)
        .await
        .expect("session registered");
    assert!(
        meta.connection_id.starts_with("socket-"),
        "socket sessions carry a socket connection id, got: {}",
        meta.connection_id
    );

    cancel.cancel();
    handle.await.expect("listener task joins");
}

/// Dropping the client stream puts its sessions into the disconnect grace
/// window rather than evicting them.
#[tokio::test]
#[serial_test::serial]
async fn client_disconnect_enters_grace_window() {
    let socket_name = format!("agent-bridge-test-{}", Uuid::new_v4());
    let bridge = Arc::new(Bridge::new(test_config(2, 2), Arc::new(EchoAgent)));
    let cancel = CancellationToken::new();

    let handle = agent_bridge::transport::socket::spawn_socket_listener(
        Arc::clone(&bridge),
        &socket_name,
        cancel.clone(),
    )
    .expect("listener must start");

    let name = socket_name
        .as_str()
        .to_ns_name::<GenericNamespaced>()
        .expect("valid socket name");
    let stream = Stream::connect(name).await.expect("client connect");
    let (rx, mut tx) = stream.split();
    let mut reader = BufReader::new(rx);

    let mut session_id = String::new();
    for (id, method) in [(1, "initialize"), (2, "session/new")] {
        let mut line = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": {},
        })
        .to_string();
        line.push('\n');
        tx.write_all(line.as_bytes()).await.expect("write request");

        let mut buf = String::new();
        reader.read_line(&mut buf).await.expect("read response");
        let frame: Value = serde_json::from_str(buf.trim()).expect("json frame");
        if let Some(sid) = frame["result"]["sessionId"].as_str() {
            session_id = sid.to_owned();
        }
    }
    assert!(!session_id.is_empty(), "session/new must return an id");
    assert_eq!(bridge.registry().len().await, 1);

    drop(tx);
    drop(reader);

    // The read loop notices EOF and marks the session disconnected; poll
    // briefly since that happens on another task.
    let mut disconnected = false;
    for _ in 0..100 {
        if let Some(meta) = bridge.registry().meta(&session_id).await {
            if meta.disconnected_at.is_some() {
                disconnected = true;
                break;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(disconnected, "session must enter the grace window on EOF");
    assert!(
        bridge.registry().meta(&session_id).await.is_some(),
        "grace window keeps the session registered"
    );

    cancel.cancel();
    handle.await.expect("listener task joins");
}
