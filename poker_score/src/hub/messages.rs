//! Room hub message types.

use crate::room::{RoomId, UserId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Opaque broadcast payload, shared between all receiving connections
pub type Payload = Arc<[u8]>;

/// Identifier the hub assigns to each registered connection
pub type ConnectionId = u64;

/// Handle returned by `attach`, needed to `detach` again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub id: ConnectionId,
}

/// Messages that can be sent to the RoomHub
#[derive(Debug)]
pub enum HubMessage {
    /// Register a connection under a room
    Register {
        room_id: RoomId,
        user_id: UserId,
        sender: mpsc::Sender<Payload>,
        response: oneshot::Sender<ConnectionHandle>,
    },

    /// Remove a connection
    Unregister { handle: ConnectionHandle },

    /// Fan a payload out to every connection of a room
    Broadcast { room_id: RoomId, payload: Payload },

    /// Number of live connections in a room
    ConnectionCount {
        room_id: RoomId,
        response: oneshot::Sender<usize>,
    },
}
