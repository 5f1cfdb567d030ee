//! Room hub actor.
//!
//! One task owns the room → connections map; registration, removal and
//! broadcast are serialized through its mailbox.

use super::config::HubConfig;
use super::events::RoomEvent;
use super::messages::{ConnectionHandle, ConnectionId, HubMessage, Payload};
use crate::room::{RoomId, UserId};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Hub errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("Room hub is not running")]
    Closed,
}

pub type HubResult<T> = Result<T, HubError>;

/// Handle for sending messages to the hub
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubMessage>,
}

impl HubHandle {
    async fn send(&self, message: HubMessage) -> HubResult<()> {
        self.sender.send(message).await.map_err(|_| HubError::Closed)
    }

    /// Register `connection` under `room_id`
    ///
    /// Returns once the hub has processed the registration, so every
    /// broadcast enqueued afterwards reaches the connection.
    pub async fn attach(
        &self,
        room_id: RoomId,
        user_id: UserId,
        connection: mpsc::Sender<Payload>,
    ) -> HubResult<ConnectionHandle> {
        let (response, rx) = oneshot::channel();
        self.send(HubMessage::Register {
            room_id,
            user_id,
            sender: connection,
            response,
        })
        .await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Remove a connection; unknown handles are ignored
    pub async fn detach(&self, handle: ConnectionHandle) -> HubResult<()> {
        self.send(HubMessage::Unregister { handle }).await
    }

    pub async fn broadcast(&self, room_id: RoomId, payload: Payload) -> HubResult<()> {
        self.send(HubMessage::Broadcast { room_id, payload }).await
    }

    /// Serialize and broadcast an event
    ///
    /// The originating operation has already committed, so failures are
    /// logged rather than returned.
    pub async fn publish(&self, room_id: RoomId, event: &RoomEvent) {
        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Room {}: failed to encode {} event: {}", room_id, event.kind(), e);
                return;
            }
        };

        if let Err(e) = self.broadcast(room_id, payload).await {
            log::warn!("Room {}: {} event not delivered: {}", room_id, event.kind(), e);
        }
    }

    pub async fn connection_count(&self, room_id: RoomId) -> HubResult<usize> {
        let (response, rx) = oneshot::channel();
        self.send(HubMessage::ConnectionCount { room_id, response })
            .await?;
        rx.await.map_err(|_| HubError::Closed)
    }
}

struct Connection {
    user_id: UserId,
    sender: mpsc::Sender<Payload>,
}

/// Actor owning every live room connection
pub struct RoomHub {
    inbox: mpsc::Receiver<HubMessage>,
    rooms: HashMap<RoomId, HashMap<ConnectionId, Connection>>,
    next_id: ConnectionId,
}

impl RoomHub {
    /// Create a hub and its handle without starting it
    pub fn new(config: &HubConfig) -> (Self, HubHandle) {
        let (sender, inbox) = mpsc::channel(config.mailbox_capacity.max(1));
        let hub = Self {
            inbox,
            rooms: HashMap::new(),
            next_id: 0,
        };
        (hub, HubHandle { sender })
    }

    /// Start a hub on the current runtime
    pub fn spawn(config: &HubConfig) -> HubHandle {
        let (hub, handle) = Self::new(config);
        tokio::spawn(hub.run());
        handle
    }

    /// Process messages until every handle is dropped
    pub async fn run(mut self) {
        log::info!("Room hub starting");

        while let Some(message) = self.inbox.recv().await {
            self.handle_message(message);
        }

        log::info!("Room hub stopped");
    }

    fn handle_message(&mut self, message: HubMessage) {
        match message {
            HubMessage::Register {
                room_id,
                user_id,
                sender,
                response,
            } => {
                self.next_id += 1;
                let handle = ConnectionHandle {
                    room_id,
                    user_id,
                    id: self.next_id,
                };
                self.rooms
                    .entry(room_id)
                    .or_default()
                    .insert(handle.id, Connection { user_id, sender });
                log::debug!(
                    "Room {}: user {} connected as {}",
                    room_id,
                    user_id,
                    handle.id
                );
                // Caller may have given up waiting; the connection stays registered
                // until it is detached or pruned.
                let _ = response.send(handle);
            }

            HubMessage::Unregister { handle } => {
                if let Some(connections) = self.rooms.get_mut(&handle.room_id) {
                    if connections.remove(&handle.id).is_some() {
                        log::debug!(
                            "Room {}: user {} disconnected ({})",
                            handle.room_id,
                            handle.user_id,
                            handle.id
                        );
                    }
                    if connections.is_empty() {
                        self.rooms.remove(&handle.room_id);
                    }
                }
            }

            HubMessage::Broadcast { room_id, payload } => self.broadcast(room_id, payload),

            HubMessage::ConnectionCount { room_id, response } => {
                let count = self.rooms.get(&room_id).map_or(0, HashMap::len);
                let _ = response.send(count);
            }
        }
    }

    fn broadcast(&mut self, room_id: RoomId, payload: Payload) {
        let Some(connections) = self.rooms.get_mut(&room_id) else {
            return;
        };

        connections.retain(|id, connection| {
            match connection.sender.try_send(payload.clone()) {
                Ok(_) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Dropping the sender closes the connection's stream.
                    log::warn!(
                        "Room {}: user {} ({}) is not keeping up, dropping connection",
                        room_id,
                        connection.user_id,
                        id
                    );
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::debug!(
                        "Room {}: user {} ({}) went away, removing",
                        room_id,
                        connection.user_id,
                        id
                    );
                    false
                }
            }
        });

        if connections.is_empty() {
            self.rooms.remove(&room_id);
        }
    }
}
