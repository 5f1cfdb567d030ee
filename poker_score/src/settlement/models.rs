//! Settlement data models.

use crate::room::{RoomId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Batch id prefix of settlements triggered by the inactivity sweep
pub const AUTO_BATCH_PREFIX: &str = "auto-";

/// Settlement row, one per non-zero balance per batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: i64,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub chip_amount: i64,
    pub rmb_amount: f64,
    pub settled_at: DateTime<Utc>,
    pub batch: String,
}

impl SettlementRecord {
    pub fn is_automatic(&self) -> bool {
        self.batch.starts_with(AUTO_BATCH_PREFIX)
    }
}

#[derive(Debug, Clone)]
pub struct NewSettlement {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub chip_amount: i64,
    pub rmb_amount: f64,
    pub settled_at: DateTime<Utc>,
    pub batch: String,
}

/// One payment of a settlement plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEntry {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub chip_amount: i64,
    pub rmb_amount: f64,
    pub description: String,
}

/// Advisory plan produced by `propose`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementProposal {
    pub room_id: RoomId,
    pub initiated_by: UserId,
    pub initiated_at: DateTime<Utc>,
    pub plan: Vec<TransferEntry>,
    pub table_balance: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementDetail {
    pub user_id: UserId,
    pub chip_amount: i64,
    pub rmb_amount: f64,
}

/// What a committed settlement batch wrote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementReceipt {
    pub room_id: RoomId,
    pub batch: String,
    pub settled_at: DateTime<Utc>,
    pub chip_rate: String,
    pub details: Vec<SettlementDetail>,
}
