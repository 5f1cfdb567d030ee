//! # Poker Score
//!
//! Chip bookkeeping for informal poker sessions played in shared rooms.
//!
//! Players join a room with a 6-digit code, wager chips into a shared pot,
//! withdraw from it, and finally settle the room into currency transfers.
//! The crate is organised around a handful of cooperating components:
//!
//! - [`store`]: the transactional persistence boundary (`LedgerStore`/`LedgerTx`)
//!   with a PostgreSQL and an in-memory implementation
//! - [`ledger`]: bet/withdraw/force-transfer/niuniu-bet as atomic units, with the
//!   pot always derived from the operation log
//! - [`settlement`]: two-phase propose/confirm cash-out and the transfer plan
//! - [`room`]: membership transitions, manual dissolution and the inactivity sweep
//! - [`hub`]: single-task actor fanning room events out to live connections
//!
//! ## Conservation
//!
//! For every room, `sum(balances) + pot == 0` holds after each committed
//! operation, where the pot is `max(0, bets - withdrawals)` over the log.
//!
//! ## Example
//!
//! ```no_run
//! use poker_score::{
//!     hub::{HubConfig, RoomHub},
//!     ledger::RoomLedger,
//!     room::{GameVariant, LifecycleConfig, RoomManager},
//!     settlement::SettlementEngine,
//!     store::{LedgerStore, MemoryLedgerStore},
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
//!     let hub = RoomHub::spawn(&HubConfig::default());
//!     let ledger = RoomLedger::new(store.clone(), hub.clone());
//!     let settlement = SettlementEngine::new(store.clone(), hub.clone());
//!     let rooms = RoomManager::new(store, hub, settlement, LifecycleConfig::default());
//!
//!     let (room, _) = rooms.create_room(1, GameVariant::Texas, "20:1").await?;
//!     let outcome = ledger.bet(room.id, 1, 100).await?;
//!     println!("balance {} pot {}", outcome.balance, outcome.table_balance);
//!     Ok(())
//! }
//! ```

/// PostgreSQL connection pooling and migrations.
pub mod db;

/// Room event fan-out actor.
pub mod hub;

/// Atomic chip operations and pot derivation.
pub mod ledger;

/// Room lifecycle: membership, dissolution, inactivity sweep.
pub mod room;

/// Settlement proposal, confirmation and currency conversion.
pub mod settlement;

/// Transactional persistence boundary.
pub mod store;

pub use hub::{HubHandle, RoomEvent, RoomHub};
pub use ledger::{LedgerError, LedgerResult, RoomLedger};
pub use room::{RoomId, RoomManager, UserId};
pub use settlement::SettlementEngine;
pub use store::{LedgerStore, LedgerTx, MemoryLedgerStore, PgLedgerStore};
