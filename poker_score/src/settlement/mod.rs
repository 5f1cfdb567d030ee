//! Settlement of room balances into currency transfers.

pub mod engine;
pub mod models;
pub mod plan;
pub mod rate;

pub use engine::SettlementEngine;
pub(crate) use engine::{manual_batch_id, require_empty_pot, settle_in_tx};
pub use models::{
    AUTO_BATCH_PREFIX, NewSettlement, SettlementDetail, SettlementProposal, SettlementReceipt,
    SettlementRecord, TransferEntry,
};
pub use plan::generate_plan;
pub use rate::{ChipRate, calculate_rmb_amount};
