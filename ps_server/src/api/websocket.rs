//! WebSocket bridge between a room member and the room core.
//!
//! # Connection Flow
//!
//! 1. The upstream gateway authenticates the caller and forwards
//!    `GET /ws/{room_id}` with the resolved id in the `x-user-id` header
//! 2. The caller is marked back online in the room (must hold an open membership)
//! 3. The socket is attached to the room hub; every room event is pushed as a
//!    JSON text frame
//! 4. Client commands are JSON objects tagged by `type`; each one is answered
//!    with a `success` or `error` frame
//! 5. On disconnect the socket is detached and the member marked offline
//!
//! # Example
//!
//! ```javascript
//! ws.send(JSON.stringify({ type: "bet", amount: 100 }));
//! ws.send(JSON.stringify({ type: "niuniu_bet", bets: [{ to_user_id: 2, amount: 50 }] }));
//! ws.send(JSON.stringify({ type: "withdraw" }));          // amount omitted: whole pot
//! ws.send(JSON.stringify({ type: "confirm_settlement" }));
//! ```

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use poker_score::{
    LedgerError, LedgerResult, RoomId, UserId,
    hub::Payload,
    ledger::NiuniuBetItem,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use super::AppState;
use crate::logging::log_ledger_event;

/// Header carrying the caller resolved by the upstream gateway
pub const USER_ID_HEADER: &str = "x-user-id";

const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Client commands received via WebSocket
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Bet {
        amount: i64,
    },
    /// `amount` of zero or omitted withdraws the whole pot
    Withdraw {
        #[serde(default)]
        amount: i64,
    },
    ForceTransfer {
        target_user_id: UserId,
    },
    NiuniuBet {
        bets: Vec<NiuniuBetItem>,
    },
    ProposeSettlement,
    ConfirmSettlement,
    Leave,
    Kick {
        target_user_id: UserId,
    },
    Dissolve,
    Details,
    History {
        #[serde(default)]
        limit: Option<i64>,
        #[serde(default)]
        offset: i64,
        #[serde(default)]
        include_all: bool,
    },
    HistoryAmounts,
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Bet { .. } => "bet",
            ClientMessage::Withdraw { .. } => "withdraw",
            ClientMessage::ForceTransfer { .. } => "force_transfer",
            ClientMessage::NiuniuBet { .. } => "niuniu_bet",
            ClientMessage::ProposeSettlement => "propose_settlement",
            ClientMessage::ConfirmSettlement => "confirm_settlement",
            ClientMessage::Leave => "leave",
            ClientMessage::Kick { .. } => "kick",
            ClientMessage::Dissolve => "dissolve",
            ClientMessage::Details => "details",
            ClientMessage::History { .. } => "history",
            ClientMessage::HistoryAmounts => "history_amounts",
        }
    }

    /// Commands after which the socket has no room left to follow
    fn ends_session(&self) -> bool {
        matches!(self, ClientMessage::Leave | ClientMessage::Dissolve)
    }
}

/// Response frames sent to the client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    Success {
        command: &'static str,
        data: serde_json::Value,
    },
    Error {
        command: &'static str,
        code: &'static str,
        message: String,
    },
}

impl ServerResponse {
    fn is_success(&self) -> bool {
        matches!(self, ServerResponse::Success { .. })
    }
}

/// Read the caller id forwarded by the gateway
pub fn user_id_from_headers(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get(USER_ID_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<UserId>()
        .ok()
        .filter(|id| *id > 0)
}

fn rejection_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::NotAMember { .. } => StatusCode::FORBIDDEN,
        LedgerError::RoomNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::RoomDissolved(_) => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Upgrade an HTTP request to a live room connection.
///
/// Responds `401 Unauthorized` without a usable `x-user-id`, `403` when the
/// caller holds no open membership, `404`/`410` for unknown or dissolved rooms.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<RoomId>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let Some(user_id) = user_id_from_headers(&headers) else {
        return (StatusCode::UNAUTHORIZED, "Missing or invalid x-user-id").into_response();
    };

    if let Err(e) = state.rooms.return_to_room(room_id, user_id).await {
        warn!("Room {}: user {} refused: {}", room_id, user_id, e);
        return (rejection_status(&e), e.client_message()).into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, room_id, user_id, state))
}

/// Drive one established connection until either side goes away
async fn handle_socket(socket: WebSocket, room_id: RoomId, user_id: UserId, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (event_tx, mut event_rx) = mpsc::channel::<Payload>(state.connection_buffer);
    let handle = match state.hub.attach(room_id, user_id, event_tx).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Room {}: failed to attach user {}: {}", room_id, user_id, e);
            return;
        }
    };

    info!("WebSocket connected: room={}, user={}", room_id, user_id);

    let (response_tx, mut response_rx) = mpsc::channel::<String>(32);

    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                Some(response_json) = response_rx.recv() => {
                    if sender.send(Message::Text(response_json.into())).await.is_err() {
                        break;
                    }
                }
                event = event_rx.recv() => {
                    // None: detached, or dropped by the hub for falling behind
                    let Some(payload) = event else { break };
                    let text = String::from_utf8_lossy(&payload).into_owned();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let (response, ends_session) = match serde_json::from_str::<ClientMessage>(&text)
                {
                    Ok(client_msg) => {
                        let ends = client_msg.ends_session();
                        let response =
                            handle_client_message(client_msg, room_id, user_id, &state).await;
                        let ends = ends && response.is_success();
                        (response, ends)
                    }
                    Err(e) => {
                        warn!("Room {}: bad message from user {}: {}", room_id, user_id, e);
                        let response = ServerResponse::Error {
                            command: "unknown",
                            code: "invalid_message",
                            message: "Invalid message format".to_string(),
                        };
                        (response, false)
                    }
                };

                if let Ok(json) = serde_json::to_string(&response)
                    && response_tx.send(json).await.is_err()
                {
                    break;
                }

                if ends_session {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket closed: room={}, user={}", room_id, user_id);
                break;
            }
            Err(e) => {
                warn!("WebSocket error: room={}, user={}: {}", room_id, user_id, e);
                break;
            }
            _ => {}
        }
    }

    // Closing both feeds lets the send task flush queued frames and exit
    drop(response_tx);
    if let Err(e) = state.hub.detach(handle).await {
        warn!("Room {}: failed to detach user {}: {}", room_id, user_id, e);
    }
    if tokio::time::timeout(FLUSH_TIMEOUT, &mut send_task).await.is_err() {
        send_task.abort();
    }
    if let Err(e) = state.rooms.disconnect(room_id, user_id).await {
        error!("Room {}: failed to mark user {} offline: {}", room_id, user_id, e);
    }

    info!("WebSocket disconnected: room={}, user={}", room_id, user_id);
}

fn respond<T: Serialize>(
    command: &'static str,
    room_id: RoomId,
    user_id: UserId,
    result: LedgerResult<T>,
) -> ServerResponse {
    match result.and_then(|value| serde_json::to_value(value).map_err(LedgerError::from)) {
        Ok(data) => {
            log_ledger_event(command, room_id, user_id, None);
            ServerResponse::Success { command, data }
        }
        Err(e) => {
            log_ledger_event(command, room_id, user_id, Some(e.code()));
            if matches!(e, LedgerError::Database(_) | LedgerError::Serialization(_)) {
                error!("Room {}: {} failed: {}", room_id, command, e);
            }
            ServerResponse::Error {
                command,
                code: e.code(),
                message: e.client_message(),
            }
        }
    }
}

/// Run one client command against the room core
pub async fn handle_client_message(
    msg: ClientMessage,
    room_id: RoomId,
    user_id: UserId,
    state: &AppState,
) -> ServerResponse {
    let command = msg.name();

    match msg {
        ClientMessage::Bet { amount } => respond(
            command,
            room_id,
            user_id,
            state.ledger.bet(room_id, user_id, amount).await,
        ),
        ClientMessage::Withdraw { amount } => respond(
            command,
            room_id,
            user_id,
            state.ledger.withdraw(room_id, user_id, amount).await,
        ),
        ClientMessage::ForceTransfer { target_user_id } => respond(
            command,
            room_id,
            user_id,
            state
                .ledger
                .force_transfer(room_id, user_id, target_user_id)
                .await,
        ),
        ClientMessage::NiuniuBet { bets } => respond(
            command,
            room_id,
            user_id,
            state.ledger.niuniu_bet(room_id, user_id, &bets).await,
        ),
        ClientMessage::ProposeSettlement => respond(
            command,
            room_id,
            user_id,
            state.settlement.propose(room_id, user_id).await,
        ),
        ClientMessage::ConfirmSettlement => respond(
            command,
            room_id,
            user_id,
            state.settlement.confirm(room_id, user_id).await,
        ),
        ClientMessage::Leave => respond(
            command,
            room_id,
            user_id,
            state.rooms.leave(room_id, user_id).await,
        ),
        ClientMessage::Kick { target_user_id } => respond(
            command,
            room_id,
            user_id,
            state.rooms.kick(room_id, user_id, target_user_id).await,
        ),
        ClientMessage::Dissolve => respond(
            command,
            room_id,
            user_id,
            state.rooms.dissolve(room_id, user_id).await,
        ),
        ClientMessage::Details => respond(
            command,
            room_id,
            user_id,
            state.rooms.room_details(room_id, user_id).await,
        ),
        ClientMessage::History {
            limit,
            offset,
            include_all,
        } => respond(
            command,
            room_id,
            user_id,
            state
                .rooms
                .operations(room_id, user_id, limit, offset.max(0), include_all)
                .await,
        ),
        ClientMessage::HistoryAmounts => respond(
            command,
            room_id,
            user_id,
            state.ledger.history_amounts(room_id, user_id).await,
        ),
    }
}
