//! Room ledger: per-member balances, the operation log and the derived pot.

pub mod engine;
pub mod errors;
pub mod models;

pub use engine::RoomLedger;
pub(crate) use engine::{require_active_room, require_member, table_balance_in};
pub use errors::{LedgerError, LedgerResult};
pub use models::{
    BetOutcome, BetRecord, HistoryAmounts, NewBetRecord, NewOperation, NiuniuBetItem,
    NiuniuBetOutcome, OperationKind, OperationRecord, TransferOutcome, WithdrawOutcome,
    pot_from_totals,
};
