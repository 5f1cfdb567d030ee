//! WebSocket integration tests.
//!
//! A real server is bound to an ephemeral port over the in-memory store and
//! driven with `tokio-tungstenite` clients.

use futures_util::{SinkExt, StreamExt};
use poker_score::{
    MemoryLedgerStore, RoomId, UserId,
    hub::{HubConfig, RoomHub},
    room::{GameVariant, LifecycleConfig, MemberStatus},
};
use ps_server::api::{AppState, create_router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message, client::IntoClientRequest},
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper to start a server; returns its address and shared state
async fn start_server() -> (SocketAddr, AppState) {
    let state = AppState::new(
        Arc::new(MemoryLedgerStore::new()),
        RoomHub::spawn(&HubConfig::default()),
        LifecycleConfig::default(),
        16,
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Room created by user 1 with `others` joined
async fn room_with(state: &AppState, others: &[UserId]) -> RoomId {
    let (room, _) = state
        .rooms
        .create_room(1, GameVariant::Niuniu, "20:1")
        .await
        .unwrap();
    for user in others {
        state.rooms.join(room.id, *user).await.unwrap();
    }
    room.id
}

async fn connect(
    addr: SocketAddr,
    room_id: RoomId,
    user_id: Option<UserId>,
) -> Result<Client, tungstenite::Error> {
    let mut request = format!("ws://{}/ws/{}", addr, room_id)
        .into_client_request()
        .unwrap();
    if let Some(user_id) = user_id {
        request
            .headers_mut()
            .insert("x-user-id", user_id.to_string().parse().unwrap());
    }

    connect_async(request).await.map(|(ws, _)| ws)
}

/// Wait until the hub has `expected` sockets in the room
async fn wait_for_connections(state: &AppState, room_id: RoomId, expected: usize) {
    for _ in 0..100 {
        if state.hub.connection_count(room_id).await.unwrap() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("room {} never reached {} connections", room_id, expected);
}

/// Next JSON text frame, skipping control frames
async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Next frame whose `type` matches
async fn next_of_type(ws: &mut Client, kind: &str) -> Value {
    loop {
        let value = next_json(ws).await;
        if value["type"] == kind {
            return value;
        }
    }
}

async fn send(ws: &mut Client, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_connection_without_user_id_is_unauthorized() {
    let (addr, state) = start_server().await;
    let room = room_with(&state, &[]).await;

    match connect(addr, room, None).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 401),
        other => panic!("expected 401, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_connection_from_non_member_is_forbidden() {
    let (addr, state) = start_server().await;
    let room = room_with(&state, &[2]).await;

    match connect(addr, room, Some(9)).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 403),
        other => panic!("expected 403, got {:?}", other.map(|_| ())),
    }

    match connect(addr, 4242, Some(1)).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 404),
        other => panic!("expected 404, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_bet_is_answered_and_broadcast() {
    let (addr, state) = start_server().await;
    let room = room_with(&state, &[2]).await;

    let mut host = connect(addr, room, Some(1)).await.unwrap();
    let mut player = connect(addr, room, Some(2)).await.unwrap();
    wait_for_connections(&state, room, 2).await;

    send(&mut player, json!({"type": "bet", "amount": 50})).await;

    let response = next_of_type(&mut player, "success").await;
    assert_eq!(response["command"], "bet");
    assert_eq!(response["data"]["balance"], -50);
    assert_eq!(response["data"]["table_balance"], 50);

    let event = next_of_type(&mut host, "bet").await;
    assert_eq!(event["data"]["user_id"], 2);
    assert_eq!(event["data"]["amount"], 50);
}

#[tokio::test]
async fn test_rejected_command_returns_error_code() {
    let (addr, state) = start_server().await;
    let room = room_with(&state, &[2]).await;

    let mut player = connect(addr, room, Some(2)).await.unwrap();
    wait_for_connections(&state, room, 1).await;

    send(&mut player, json!({"type": "withdraw"})).await;
    let response = next_of_type(&mut player, "error").await;
    assert_eq!(response["command"], "withdraw");
    assert_eq!(response["code"], "pot_empty");

    send(&mut player, json!({"type": "bet", "amount": -5})).await;
    let response = next_of_type(&mut player, "error").await;
    assert_eq!(response["code"], "invalid_amount");

    player.send(Message::text("not json")).await.unwrap();
    let response = next_of_type(&mut player, "error").await;
    assert_eq!(response["code"], "invalid_message");
}

#[tokio::test]
async fn test_settlement_over_the_socket() {
    let (addr, state) = start_server().await;
    let room = room_with(&state, &[2]).await;

    let mut host = connect(addr, room, Some(1)).await.unwrap();
    wait_for_connections(&state, room, 1).await;

    state.ledger.bet(room, 2, 200).await.unwrap();
    send(&mut host, json!({"type": "withdraw", "amount": 0})).await;
    let response = next_of_type(&mut host, "success").await;
    assert_eq!(response["data"]["amount"], 200);

    send(&mut host, json!({"type": "confirm_settlement"})).await;
    let event = next_of_type(&mut host, "settlement_confirmed").await;
    assert_eq!(event["data"]["confirmed_by"], 1);

    let rows = state.settlement.settlements(room).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r.user_id == 1 && r.rmb_amount == 10.0));
}

#[tokio::test]
async fn test_disconnect_marks_member_offline() {
    let (addr, state) = start_server().await;
    let room = room_with(&state, &[2]).await;

    let mut player = connect(addr, room, Some(2)).await.unwrap();
    wait_for_connections(&state, room, 1).await;
    player.close(None).await.unwrap();
    wait_for_connections(&state, room, 0).await;

    for _ in 0..100 {
        let details = state.rooms.room_details(room, 1).await.unwrap();
        let member = details.members.iter().find(|m| m.user_id == 2).unwrap();
        if member.status == MemberStatus::Offline {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("member 2 was never marked offline");
}

#[tokio::test]
async fn test_leave_closes_the_socket() {
    let (addr, state) = start_server().await;
    let room = room_with(&state, &[2]).await;

    let mut player = connect(addr, room, Some(2)).await.unwrap();
    wait_for_connections(&state, room, 1).await;

    send(&mut player, json!({"type": "leave"})).await;
    let response = next_of_type(&mut player, "success").await;
    assert_eq!(response["command"], "leave");

    // Remaining frames drain, then the server closes
    let closed = timeout(Duration::from_secs(2), async {
        while let Some(frame) = player.next().await {
            if matches!(frame, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    wait_for_connections(&state, room, 0).await;
}
