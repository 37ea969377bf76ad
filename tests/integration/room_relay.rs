//! Integration tests for room setup, joining, and typing indicators.
//!
//! Runs a real relay on a random port and drives it with WebSocket clients
//! speaking the JSON event protocol.
//!
//! Verification command: `cargo test --test room_relay`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite;

use roomcast_proto::codec;
use roomcast_proto::event::{ClientEvent, ServerEvent};
use roomcast_proto::id::RoomId;
use roomcast_relay::server::{RelayState, start_server_with_state};

// =============================================================================
// Helpers
// =============================================================================

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn room(id: &str) -> RoomId {
    RoomId::new(id).unwrap()
}

/// Starts a relay on a random port and returns its address and shared state.
async fn start_relay() -> (SocketAddr, Arc<RelayState>) {
    let state = Arc::new(RelayState::new());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start test relay");
    (addr, state)
}

async fn connect(addr: SocketAddr) -> WsStream {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

async fn send_event(ws: &mut WsStream, event: ClientEvent) {
    let text = codec::encode_client(event).unwrap();
    ws.send(tungstenite::Message::Text(text.into())).await.unwrap();
}

async fn send_raw(ws: &mut WsStream, text: &str) {
    ws.send(tungstenite::Message::Text(text.to_owned().into()))
        .await
        .unwrap();
}

/// Receives the next server event, skipping control frames.
async fn recv_event(ws: &mut WsStream) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("recv timed out")
            .unwrap()
            .unwrap();
        if let tungstenite::Message::Text(text) = msg {
            return codec::decode_server(text.as_str()).unwrap();
        }
    }
}

/// Asserts that no event arrives within a short window.
async fn assert_silent(ws: &mut WsStream) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(200);
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(tungstenite::Message::Text(text)))) => {
                panic!("unexpected event: {text}");
            }
            Ok(Some(Ok(_))) => {}
            Ok(other) => panic!("connection ended unexpectedly: {other:?}"),
        }
    }
}

/// Polls until `check` holds, failing after a few seconds.
async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Connects a client and completes `setup` for `user`.
async fn connect_as(addr: SocketAddr, user: &str) -> WsStream {
    let mut ws = connect(addr).await;
    send_event(&mut ws, ClientEvent::Setup(Some(room(user)))).await;
    assert_eq!(recv_event(&mut ws).await, ServerEvent::Connected);
    ws
}

/// Joins `chat` and waits for the registry to reflect `members` members.
async fn join(ws: &mut WsStream, state: &RelayState, chat: &str, members: usize) {
    send_event(ws, ClientEvent::JoinRoom(Some(room(chat)))).await;
    let registry = Arc::clone(state.relay.registry());
    let chat = room(chat);
    wait_until(|| registry.members(&chat).len() == members).await;
}

// =============================================================================
// Setup
// =============================================================================

#[tokio::test]
async fn setup_acknowledges_with_connected() {
    let (addr, state) = start_relay().await;
    let mut ws = connect(addr).await;

    send_raw(&mut ws, r#"{"event":"setup","data":{"id":"u1","name":"Ada"}}"#).await;
    assert_eq!(recv_event(&mut ws).await, ServerEvent::Connected);

    let registry = state.relay.registry();
    assert_eq!(registry.members(&room("u1")).len(), 1);
}

#[tokio::test]
async fn setup_without_id_is_ignored() {
    let (addr, state) = start_relay().await;
    let mut ws = connect(addr).await;

    send_raw(&mut ws, r#"{"event":"setup","data":{"name":"nobody"}}"#).await;
    send_raw(&mut ws, r#"{"event":"setup","data":{"id":""}}"#).await;
    assert_silent(&mut ws).await;
    assert_eq!(state.relay.registry().room_count(), 0);
}

#[tokio::test]
async fn numeric_user_id_gets_personal_room_and_messages() {
    let (addr, state) = start_relay().await;
    let mut numeric = connect(addr).await;
    send_raw(&mut numeric, r#"{"event":"setup","data":{"id":42}}"#).await;
    assert_eq!(recv_event(&mut numeric).await, ServerEvent::Connected);

    let personal = RoomId::from_value(&json!(42)).unwrap();
    assert_eq!(state.relay.registry().members(&personal).len(), 1);
    // The string "42" is a different room.
    assert!(state.relay.registry().members(&room("42")).is_empty());

    let mut alice = connect_as(addr, "alice").await;
    let message = json!({
        "content": "hi 42",
        "sender": { "_id": "alice" },
        "chatId": { "users": [ { "_id": "alice" }, { "_id": 42 } ] }
    });
    send_event(&mut alice, ClientEvent::NewMessage(message.clone())).await;
    assert_eq!(
        recv_event(&mut numeric).await,
        ServerEvent::MessageReceived(message)
    );
}

#[tokio::test]
async fn zero_ping_interval_still_serves_connections() {
    let state = Arc::new(RelayState::new().with_keepalive(Duration::ZERO, Duration::from_secs(5)));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start test relay");

    let mut alice = connect_as(addr, "alice").await;
    let mut bob = connect_as(addr, "bob").await;
    join(&mut alice, &state, "c1", 1).await;
    join(&mut bob, &state, "c1", 2).await;

    send_event(&mut alice, ClientEvent::Typing(Some(room("c1")))).await;
    assert_eq!(recv_event(&mut bob).await, ServerEvent::Typing);
}

#[tokio::test]
async fn repeated_setup_moves_personal_room() {
    let (addr, state) = start_relay().await;
    let mut ws = connect_as(addr, "old").await;

    send_event(&mut ws, ClientEvent::Setup(Some(room("new")))).await;
    assert_eq!(recv_event(&mut ws).await, ServerEvent::Connected);

    let registry = state.relay.registry();
    assert!(registry.members(&room("old")).is_empty());
    assert_eq!(registry.members(&room("new")).len(), 1);
}

// =============================================================================
// Typing indicators
// =============================================================================

#[tokio::test]
async fn typing_reaches_other_room_members_only() {
    let (addr, state) = start_relay().await;
    let mut alice = connect_as(addr, "alice").await;
    let mut bob = connect_as(addr, "bob").await;
    let mut carol = connect_as(addr, "carol").await;

    join(&mut alice, &state, "c1", 1).await;
    join(&mut bob, &state, "c1", 2).await;

    send_event(&mut alice, ClientEvent::Typing(Some(room("c1")))).await;
    assert_eq!(recv_event(&mut bob).await, ServerEvent::Typing);

    send_event(&mut alice, ClientEvent::StopTyping(Some(room("c1")))).await;
    assert_eq!(recv_event(&mut bob).await, ServerEvent::StopTyping);

    // The sender never hears its own indicator, non-members hear nothing.
    assert_silent(&mut alice).await;
    assert_silent(&mut carol).await;
}

#[tokio::test]
async fn typing_frames_carry_no_room_id() {
    let (addr, state) = start_relay().await;
    let mut alice = connect_as(addr, "alice").await;
    let mut bob = connect_as(addr, "bob").await;
    join(&mut alice, &state, "c1", 1).await;
    join(&mut bob, &state, "c1", 2).await;

    send_raw(&mut alice, r#"{"event":"typing","data":"c1"}"#).await;

    let msg = tokio::time::timeout(Duration::from_secs(5), bob.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let frame: serde_json::Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
    assert_eq!(frame, json!({ "event": "typing" }));
}

#[tokio::test]
async fn typing_in_unknown_room_is_a_no_op() {
    let (addr, _state) = start_relay().await;
    let mut alice = connect_as(addr, "alice").await;

    send_event(&mut alice, ClientEvent::Typing(Some(room("ghost")))).await;
    send_raw(&mut alice, r#"{"event":"typing"}"#).await;
    assert_silent(&mut alice).await;
}

// =============================================================================
// End-to-end chat scenario
// =============================================================================

#[tokio::test]
async fn two_users_chat_end_to_end() {
    let (addr, state) = start_relay().await;
    let mut alice = connect_as(addr, "alice").await;
    let mut bob = connect_as(addr, "bob").await;

    join(&mut alice, &state, "chat-1", 1).await;
    join(&mut bob, &state, "chat-1", 2).await;

    send_event(&mut bob, ClientEvent::Typing(Some(room("chat-1")))).await;
    assert_eq!(recv_event(&mut alice).await, ServerEvent::Typing);

    let message = json!({
        "_id": "m1",
        "content": "hello alice",
        "sender": { "_id": "bob", "name": "Bob" },
        "chatId": {
            "_id": "chat-1",
            "users": [ { "_id": "alice" }, { "_id": "bob" } ]
        }
    });
    send_event(&mut bob, ClientEvent::StopTyping(Some(room("chat-1")))).await;
    send_event(&mut bob, ClientEvent::NewMessage(message.clone())).await;

    assert_eq!(recv_event(&mut alice).await, ServerEvent::StopTyping);
    assert_eq!(
        recv_event(&mut alice).await,
        ServerEvent::MessageReceived(message)
    );
    assert_silent(&mut bob).await;
}
