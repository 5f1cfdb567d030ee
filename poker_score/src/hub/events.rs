//! Room events pushed to connected clients.

use super::messages::Payload;
use crate::ledger::NiuniuBetItem;
use crate::room::{MemberStatus, RoomId, UserId};
use crate::settlement::{SettlementDetail, TransferEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event broadcast to a room, encoded as `{"type": ..., "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RoomEvent {
    UserJoined {
        user_id: UserId,
        balance: i64,
        status: MemberStatus,
        joined_at: DateTime<Utc>,
    },
    UserReturned {
        user_id: UserId,
        balance: i64,
        status: MemberStatus,
        returned_at: DateTime<Utc>,
    },
    UserLeft {
        user_id: UserId,
        status: MemberStatus,
        left_at: DateTime<Utc>,
    },
    UserKicked {
        user_id: UserId,
        kicked_by: UserId,
        status: MemberStatus,
        kicked_at: DateTime<Utc>,
    },
    Bet {
        user_id: UserId,
        amount: i64,
        balance: i64,
        table_balance: i64,
        created_at: DateTime<Utc>,
    },
    Withdraw {
        user_id: UserId,
        amount: i64,
        balance: i64,
        table_balance: i64,
        created_at: DateTime<Utc>,
    },
    ForceTransfer {
        user_id: UserId,
        target_user_id: UserId,
        amount: i64,
        balance: i64,
        target_balance: i64,
        table_balance: i64,
        created_at: DateTime<Utc>,
    },
    NiuniuBet {
        user_id: UserId,
        total_amount: i64,
        balance: i64,
        table_balance: i64,
        bets: Vec<NiuniuBetItem>,
        created_at: DateTime<Utc>,
    },
    SettlementInitiated {
        initiated_by: UserId,
        initiated_at: DateTime<Utc>,
        settlement_plan: Vec<TransferEntry>,
        table_balance: i64,
    },
    SettlementConfirmed {
        confirmed_by: UserId,
        settlement_batch: String,
        settled_at: DateTime<Utc>,
        details: Vec<SettlementDetail>,
    },
    RoomDissolved {
        room_id: RoomId,
        dissolved_at: DateTime<Utc>,
        settlement_batch: Option<String>,
    },
}

impl RoomEvent {
    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            RoomEvent::UserJoined { .. } => "user_joined",
            RoomEvent::UserReturned { .. } => "user_returned",
            RoomEvent::UserLeft { .. } => "user_left",
            RoomEvent::UserKicked { .. } => "user_kicked",
            RoomEvent::Bet { .. } => "bet",
            RoomEvent::Withdraw { .. } => "withdraw",
            RoomEvent::ForceTransfer { .. } => "force_transfer",
            RoomEvent::NiuniuBet { .. } => "niuniu_bet",
            RoomEvent::SettlementInitiated { .. } => "settlement_initiated",
            RoomEvent::SettlementConfirmed { .. } => "settlement_confirmed",
            RoomEvent::RoomDissolved { .. } => "room_dissolved",
        }
    }

    pub fn to_payload(&self) -> Result<Payload, serde_json::Error> {
        Ok(serde_json::to_vec(self)?.into())
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
