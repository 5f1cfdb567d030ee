use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Room identifier
pub type RoomId = i64;

/// User identifier, issued by the excluded identity layer
pub type UserId = i64;

/// Actor recorded for automatic operations
pub const SYSTEM_USER_ID: UserId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Active,
    Dissolved,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Active => "active",
            RoomStatus::Dissolved => "dissolved",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "active" => RoomStatus::Active,
            _ => RoomStatus::Dissolved,
        }
    }
}

/// Game played in the room; informs clients only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameVariant {
    Texas,
    Niuniu,
}

impl GameVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameVariant::Texas => "texas",
            GameVariant::Niuniu => "niuniu",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "niuniu" => GameVariant::Niuniu,
            _ => GameVariant::Texas,
        }
    }
}

/// Presence of a member while the membership is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Online,
    Offline,
    Kicked,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Online => "online",
            MemberStatus::Offline => "offline",
            MemberStatus::Kicked => "kicked",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "online" => MemberStatus::Online,
            "kicked" => MemberStatus::Kicked,
            _ => MemberStatus::Offline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub code: String,
    pub variant: GameVariant,
    /// "chips:currency", e.g. "20:1"
    pub chip_rate: String,
    pub status: RoomStatus,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub dissolved_at: Option<DateTime<Utc>>,
}

impl Room {
    pub fn is_active(&self) -> bool {
        self.status == RoomStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct NewRoom {
    pub code: String,
    pub variant: GameVariant,
    pub chip_rate: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Association of a user with a room; open while `left_at` is unset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: i64,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub status: MemberStatus,
}

impl Membership {
    pub fn is_open(&self) -> bool {
        self.left_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberBalance {
    pub user_id: UserId,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    pub user_id: UserId,
    pub balance: i64,
    pub status: MemberStatus,
    pub joined_at: DateTime<Utc>,
}

/// Snapshot of a room as seen by one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomDetails {
    pub room: Room,
    pub members: Vec<MemberView>,
    pub my_balance: i64,
    pub table_balance: i64,
}

/// Page of the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationPage {
    pub operations: Vec<crate::ledger::OperationRecord>,
    pub total: i64,
}

/// Outcome of one inactivity sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub inspected: usize,
    pub dissolved: Vec<RoomId>,
    pub failed: usize,
}
