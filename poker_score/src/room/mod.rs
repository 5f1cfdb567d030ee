//! Rooms: creation, membership transitions and the active → dissolved lifecycle.

pub mod code;
pub mod config;
pub mod lifecycle;
pub mod manager;
pub mod models;

pub use code::{generate_room_code, is_valid_room_code};
pub use config::LifecycleConfig;
pub use manager::RoomManager;
pub use models::{
    GameVariant, MemberBalance, MemberStatus, MemberView, Membership, NewRoom, OperationPage,
    Room, RoomDetails, RoomId, RoomStatus, SYSTEM_USER_ID, SweepReport, UserId,
};
