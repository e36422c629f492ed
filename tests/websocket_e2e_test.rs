// ABOUTME: Real WebSocket server E2E tests for the signaling channel
// ABOUTME: Drives a bound Axum server with a real client through handshake, heartbeat, and fan-out
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

mod common;

use common::{build_harness, default_harness, test_config, TestHarness};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use switchboard_call_server::{models::Call, routes};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Bind the full router on an ephemeral port and serve it in the background
async fn start_server(harness: &TestHarness) -> SocketAddr {
    harness.resources.websocket_manager.start_background_tasks();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::router(harness.resources.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> WsStream {
    let (ws, _) = timeout(
        Duration::from_secs(5),
        connect_async(format!("ws://{addr}/ws")),
    )
    .await
    .expect("connect timed out")
    .expect("connect failed");
    ws
}

async fn send_json(ws: &mut WsStream, value: &serde_json::Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next text frame as JSON; skips non-text frames
async fn recv_json(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a server message")
            .expect("connection closed unexpectedly")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read until the server closes the connection
async fn expect_close(ws: &mut WsStream) {
    loop {
        match timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for the server to close")
        {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(_)) => {}
        }
    }
}

async fn authenticate(ws: &mut WsStream, token: &str) {
    send_json(ws, &json!({ "type": "auth", "payload": { "token": token } })).await;
    let reply = recv_json(ws).await;
    assert_eq!(reply["type"], "success", "auth should be acknowledged: {reply}");
}

#[tokio::test]
async fn test_handshake_accepts_valid_token() {
    let harness = default_harness();
    let addr = start_server(&harness).await;

    let token = harness
        .resources
        .auth_manager
        .generate_token(Uuid::new_v4(), Uuid::new_v4())
        .unwrap();

    let mut ws = connect(addr).await;
    authenticate(&mut ws, &token).await;

    send_json(
        &mut ws,
        &json!({ "type": "subscribe", "payload": { "topics": ["tenant"] } }),
    )
    .await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "success");

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_handshake_rejects_invalid_token() {
    let harness = default_harness();
    let addr = start_server(&harness).await;

    let mut ws = connect(addr).await;
    send_json(
        &mut ws,
        &json!({ "type": "auth", "payload": { "token": "not-a-jwt" } }),
    )
    .await;

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    expect_close(&mut ws).await;
}

#[tokio::test]
async fn test_first_message_other_than_auth_drops_connection() {
    let harness = default_harness();
    let addr = start_server(&harness).await;

    let mut ws = connect(addr).await;
    // Credentials are never queued: a pre-auth subscribe is a drop, not an error event
    send_json(
        &mut ws,
        &json!({ "type": "subscribe", "payload": { "topics": ["tenant"] } }),
    )
    .await;
    expect_close(&mut ws).await;
}

#[tokio::test]
async fn test_malformed_messages_get_error_events_not_disconnects() {
    let harness = default_harness();
    let addr = start_server(&harness).await;

    let token = harness
        .resources
        .auth_manager
        .generate_token(Uuid::new_v4(), Uuid::new_v4())
        .unwrap();
    let mut ws = connect(addr).await;
    authenticate(&mut ws, &token).await;

    // Not JSON at all
    ws.send(Message::Text("this is not json".into())).await.unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");

    // Well-formed envelope, invalid payload
    send_json(
        &mut ws,
        &json!({ "type": "end_call", "payload": { "call_id": "not-a-uuid" } }),
    )
    .await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");

    // The connection survived both
    send_json(
        &mut ws,
        &json!({ "type": "subscribe", "payload": { "topics": [] } }),
    )
    .await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "success");

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_call_events_fan_out_to_the_owner_only() {
    let harness = default_harness();
    let addr = start_server(&harness).await;

    let tenant_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();
    let stranger_id = Uuid::new_v4();

    let owner_token = harness
        .resources
        .auth_manager
        .generate_token(owner_id, tenant_id)
        .unwrap();
    let stranger_token = harness
        .resources
        .auth_manager
        .generate_token(stranger_id, Uuid::new_v4())
        .unwrap();

    let mut owner_ws = connect(addr).await;
    authenticate(&mut owner_ws, &owner_token).await;
    let mut stranger_ws = connect(addr).await;
    authenticate(&mut stranger_ws, &stranger_token).await;

    let call = Call::new_outbound(
        tenant_id,
        owner_id,
        Uuid::new_v4(),
        "+15550100".into(),
        "+15550199".into(),
    );
    harness.resources.events.publish_call_update(&call);
    harness.resources.events.publish_fragment(
        &call,
        switchboard_call_server::models::TranscriptFragment {
            call_id: call.id,
            start_offset_secs: 1.0,
            channel: switchboard_call_server::models::SpeakerChannel::Caller,
            text: "hello".into(),
            confidence: 0.9,
            is_final: true,
        },
    );

    let update = recv_json(&mut owner_ws).await;
    assert_eq!(update["type"], "call.update");
    assert_eq!(update["payload"]["id"], call.id.to_string());

    let fragment = recv_json(&mut owner_ws).await;
    assert_eq!(fragment["type"], "transcript.fragment");
    assert_eq!(fragment["payload"]["text"], "hello");

    // A client from another tenant sees nothing
    let nothing = timeout(Duration::from_millis(300), stranger_ws.next()).await;
    assert!(nothing.is_err(), "stranger received an event: {nothing:?}");

    owner_ws.close(None).await.unwrap();
    stranger_ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_heartbeat_evicts_silent_connections_and_keeps_responsive_ones() {
    let mut config = test_config();
    config.websocket.heartbeat_interval = Duration::from_millis(100);
    config.websocket.heartbeat_timeout = Duration::from_millis(250);
    let harness = build_harness(config);
    let addr = start_server(&harness).await;

    let token = harness
        .resources
        .auth_manager
        .generate_token(Uuid::new_v4(), Uuid::new_v4())
        .unwrap();

    let mut silent_ws = connect(addr).await;
    authenticate(&mut silent_ws, &token).await;
    let mut responsive_ws = connect(addr).await;
    authenticate(&mut responsive_ws, &token).await;

    // The responsive client answers every ping for longer than the timeout
    let keepalive = tokio::time::Instant::now();
    let mut responsive_pings = 0;
    while keepalive.elapsed() < Duration::from_millis(600) {
        if let Ok(Some(Ok(Message::Text(text)))) =
            timeout(Duration::from_millis(50), responsive_ws.next()).await
        {
            let message: serde_json::Value = serde_json::from_str(&text).unwrap();
            if message["type"] == "ping" {
                responsive_pings += 1;
                send_json(&mut responsive_ws, &json!({ "type": "pong" })).await;
            }
        }
    }
    assert!(responsive_pings > 0, "server never pinged the connection");

    // The silent client was pinged too, never answered, and got evicted
    let mut silent_saw_ping = false;
    loop {
        match timeout(Duration::from_secs(5), silent_ws.next())
            .await
            .expect("silent connection was never evicted")
        {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
            Some(Ok(Message::Text(text))) => {
                let message: serde_json::Value = serde_json::from_str(&text).unwrap();
                if message["type"] == "ping" {
                    silent_saw_ping = true;
                }
            }
            Some(Ok(_)) => {}
        }
    }
    assert!(silent_saw_ping, "silent connection should have been pinged before eviction");

    // The responsive client is still registered and serviceable. Pings may
    // be interleaved with the acknowledgment; keep answering them.
    send_json(
        &mut responsive_ws,
        &json!({ "type": "subscribe", "payload": { "topics": ["tenant"] } }),
    )
    .await;
    loop {
        let reply = recv_json(&mut responsive_ws).await;
        if reply["type"] == "ping" {
            send_json(&mut responsive_ws, &json!({ "type": "pong" })).await;
            continue;
        }
        assert_eq!(reply["type"], "success");
        break;
    }

    responsive_ws.close(None).await.unwrap();
}
