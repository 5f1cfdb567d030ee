//! Transactional persistence boundary.
//!
//! Every mutating ledger, settlement and lifecycle operation runs inside one
//! [`LedgerTx`]. A transaction that is dropped without [`LedgerTx::commit`]
//! is rolled back, so an early `?` return never leaves partial state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ledger::{
    BetRecord, LedgerResult, NewBetRecord, NewOperation, OperationKind, OperationRecord,
};
use crate::room::{MemberBalance, MemberStatus, Membership, NewRoom, Room, RoomId, UserId};
use crate::settlement::{NewSettlement, SettlementRecord};

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Source of ledger transactions
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Start a new transaction
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>>;

    /// Check that the backing store is reachable
    async fn health_check(&self) -> LedgerResult<()>;
}

/// One all-or-nothing unit of work
#[async_trait]
pub trait LedgerTx: Send {
    /// Insert a room in `active` status
    async fn insert_room(&mut self, room: &NewRoom) -> LedgerResult<Room>;

    async fn room(&mut self, room_id: RoomId) -> LedgerResult<Option<Room>>;

    /// Read a room and hold its row lock until the transaction ends
    async fn lock_room(&mut self, room_id: RoomId) -> LedgerResult<Option<Room>>;

    async fn active_room_by_code(&mut self, code: &str) -> LedgerResult<Option<Room>>;

    async fn active_room_ids(&mut self) -> LedgerResult<Vec<RoomId>>;

    /// Flip an active room to dissolved; `false` if it was not active
    async fn mark_dissolved(&mut self, room_id: RoomId, at: DateTime<Utc>) -> LedgerResult<bool>;

    async fn insert_membership(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> LedgerResult<Membership>;

    /// The membership of `user_id` in `room_id` without a leave timestamp
    async fn open_membership(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
    ) -> LedgerResult<Option<Membership>>;

    /// Most recently joined membership, open or not
    async fn latest_membership(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
    ) -> LedgerResult<Option<Membership>>;

    /// Most recently joined open membership of a user across all rooms
    async fn latest_open_membership_of(
        &mut self,
        user_id: UserId,
    ) -> LedgerResult<Option<Membership>>;

    async fn open_memberships(&mut self, room_id: RoomId) -> LedgerResult<Vec<Membership>>;

    async fn set_member_status(
        &mut self,
        membership_id: i64,
        status: MemberStatus,
    ) -> LedgerResult<()>;

    /// Stamp the leave timestamp on every open membership of the room
    async fn close_memberships(&mut self, room_id: RoomId, at: DateTime<Utc>) -> LedgerResult<u64>;

    /// Create a zero balance row if none exists
    async fn ensure_balance(&mut self, room_id: RoomId, user_id: UserId) -> LedgerResult<()>;

    /// Atomically add `delta`; `None` if the balance row does not exist
    async fn add_balance(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        delta: i64,
    ) -> LedgerResult<Option<i64>>;

    async fn balance(&mut self, room_id: RoomId, user_id: UserId) -> LedgerResult<Option<i64>>;

    /// All balance rows of a room ordered by user id
    async fn balances(&mut self, room_id: RoomId) -> LedgerResult<Vec<MemberBalance>>;

    async fn zero_balances(&mut self, room_id: RoomId) -> LedgerResult<u64>;

    async fn append_operation(&mut self, op: &NewOperation) -> LedgerResult<OperationRecord>;

    /// Sum of amounts of the given kinds
    async fn sum_amounts(&mut self, room_id: RoomId, kinds: &[OperationKind])
    -> LedgerResult<i64>;

    async fn latest_operation_at(
        &mut self,
        room_id: RoomId,
        kinds: &[OperationKind],
    ) -> LedgerResult<Option<DateTime<Utc>>>;

    /// Operations newest first, optionally restricted to `since` onwards
    async fn operations(
        &mut self,
        room_id: RoomId,
        since: Option<DateTime<Utc>>,
        limit: Option<i64>,
        offset: i64,
    ) -> LedgerResult<Vec<OperationRecord>>;

    async fn count_operations(
        &mut self,
        room_id: RoomId,
        since: Option<DateTime<Utc>>,
    ) -> LedgerResult<i64>;

    /// Amounts of a user's most recent operations of the given kinds
    async fn recent_amounts(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        kinds: &[OperationKind],
        limit: i64,
    ) -> LedgerResult<Vec<i64>>;

    async fn insert_bet_record(&mut self, record: &NewBetRecord) -> LedgerResult<BetRecord>;

    async fn bet_records(&mut self, room_id: RoomId) -> LedgerResult<Vec<BetRecord>>;

    async fn insert_settlement(&mut self, record: &NewSettlement)
    -> LedgerResult<SettlementRecord>;

    async fn settlements(&mut self, room_id: RoomId) -> LedgerResult<Vec<SettlementRecord>>;

    /// Make every write of this transaction durable
    async fn commit(self: Box<Self>) -> LedgerResult<()>;
}
