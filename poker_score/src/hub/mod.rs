//! Room hub: actor that owns live connections and fans out room events.

pub mod actor;
pub mod config;
pub mod events;
pub mod messages;

pub use actor::{HubError, HubHandle, HubResult, RoomHub};
pub use config::HubConfig;
pub use events::RoomEvent;
pub use messages::{ConnectionHandle, ConnectionId, HubMessage, Payload};
