//! Ledger data models.

use crate::room::{RoomId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of an audit log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Join,
    Leave,
    Return,
    Bet,
    Withdraw,
    Kick,
    ForceTransfer,
    NiuniuBet,
    SettlementInitiated,
    SettlementConfirmed,
}

impl OperationKind {
    /// Kinds that put chips into the pot
    pub const BET_KINDS: &'static [OperationKind] =
        &[OperationKind::Bet, OperationKind::NiuniuBet];

    /// Kinds that take chips out of the pot
    pub const WITHDRAW_KINDS: &'static [OperationKind] =
        &[OperationKind::Withdraw, OperationKind::ForceTransfer];

    /// Kinds that count as room activity for the inactivity sweep
    pub const FINANCIAL_KINDS: &'static [OperationKind] = &[
        OperationKind::Bet,
        OperationKind::Withdraw,
        OperationKind::NiuniuBet,
        OperationKind::ForceTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Join => "join",
            OperationKind::Leave => "leave",
            OperationKind::Return => "return",
            OperationKind::Bet => "bet",
            OperationKind::Withdraw => "withdraw",
            OperationKind::Kick => "kick",
            OperationKind::ForceTransfer => "force_transfer",
            OperationKind::NiuniuBet => "niuniu_bet",
            OperationKind::SettlementInitiated => "settlement_initiated",
            OperationKind::SettlementConfirmed => "settlement_confirmed",
        }
    }

    /// Parse a stored kind; `None` for unknown values
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "create" => Some(OperationKind::Create),
            "join" => Some(OperationKind::Join),
            "leave" => Some(OperationKind::Leave),
            "return" => Some(OperationKind::Return),
            "bet" => Some(OperationKind::Bet),
            "withdraw" => Some(OperationKind::Withdraw),
            "kick" => Some(OperationKind::Kick),
            "force_transfer" => Some(OperationKind::ForceTransfer),
            "niuniu_bet" => Some(OperationKind::NiuniuBet),
            "settlement_initiated" => Some(OperationKind::SettlementInitiated),
            "settlement_confirmed" => Some(OperationKind::SettlementConfirmed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: i64,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub kind: OperationKind,
    pub amount: Option<i64>,
    pub target_user_id: Option<UserId>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Audit log entry about to be appended
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub kind: OperationKind,
    pub amount: Option<i64>,
    pub target_user_id: Option<UserId>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl NewOperation {
    pub fn new(
        room_id: RoomId,
        user_id: UserId,
        kind: OperationKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            room_id,
            user_id,
            kind,
            amount: None,
            target_user_id: None,
            description: String::new(),
            created_at,
        }
    }

    pub fn amount(mut self, amount: i64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn target(mut self, target_user_id: UserId) -> Self {
        self.target_user_id = Some(target_user_id);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Informational record of a wager naming an opponent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRecord {
    pub id: i64,
    pub room_id: RoomId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Targeted bet record about to be written
#[derive(Debug, Clone)]
pub struct NewBetRecord {
    pub room_id: RoomId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// One entry of a niuniu bet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NiuniuBetItem {
    pub to_user_id: UserId,
    pub amount: i64,
}

/// Result of a bet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BetOutcome {
    pub balance: i64,
    pub table_balance: i64,
}

/// Result of a withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WithdrawOutcome {
    pub balance: i64,
    pub table_balance: i64,
    /// Actually withdrawn, differs from the request in withdraw-all mode
    pub amount: i64,
}

/// Result of a forced pot transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    pub actor_balance: i64,
    pub target_balance: i64,
    pub table_balance: i64,
    pub amount: i64,
}

/// Result of a niuniu bet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NiuniuBetOutcome {
    pub balance: i64,
    pub total_amount: i64,
    pub table_balance: i64,
}

/// Most recent amounts a user bet and withdrew, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryAmounts {
    pub bets: Vec<i64>,
    pub withdrawals: Vec<i64>,
}

/// Pot from the summed bet-kind and withdraw-kind amounts, floored at zero
pub fn pot_from_totals(bets: i64, withdrawals: i64) -> i64 {
    bets.saturating_sub(withdrawals).max(0)
}
