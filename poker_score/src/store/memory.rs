//! In-memory ledger store.
//!
//! Transactions are serialized behind one async mutex. Each transaction works
//! on a private copy of the state that replaces the shared state on commit,
//! so dropping an uncommitted transaction discards all of its writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LedgerStore, LedgerTx};
use crate::ledger::{
    BetRecord, LedgerResult, NewBetRecord, NewOperation, OperationKind, OperationRecord,
};
use crate::room::{
    MemberBalance, MemberStatus, Membership, NewRoom, Room, RoomId, RoomStatus, UserId,
};
use crate::settlement::{NewSettlement, SettlementRecord};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    last_id: i64,
    rooms: BTreeMap<RoomId, Room>,
    memberships: Vec<Membership>,
    balances: BTreeMap<(RoomId, UserId), i64>,
    operations: Vec<OperationRecord>,
    bet_records: Vec<BetRecord>,
    settlements: Vec<SettlementRecord>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn room_operations(
        &self,
        room_id: RoomId,
        since: Option<DateTime<Utc>>,
    ) -> impl Iterator<Item = &OperationRecord> {
        self.operations
            .iter()
            .filter(move |op| op.room_id == room_id && since.is_none_or(|s| op.created_at >= s))
    }
}

/// Ledger store kept entirely in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryLedgerTx { guard, work }))
    }

    async fn health_check(&self) -> LedgerResult<()> {
        Ok(())
    }
}

struct MemoryLedgerTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn insert_room(&mut self, room: &NewRoom) -> LedgerResult<Room> {
        let id = self.work.next_id();
        let room = Room {
            id,
            code: room.code.clone(),
            variant: room.variant,
            chip_rate: room.chip_rate.clone(),
            status: RoomStatus::Active,
            created_by: room.created_by,
            created_at: room.created_at,
            dissolved_at: None,
        };
        self.work.rooms.insert(id, room.clone());
        Ok(room)
    }

    async fn room(&mut self, room_id: RoomId) -> LedgerResult<Option<Room>> {
        Ok(self.work.rooms.get(&room_id).cloned())
    }

    async fn lock_room(&mut self, room_id: RoomId) -> LedgerResult<Option<Room>> {
        // The whole store is already held exclusively.
        self.room(room_id).await
    }

    async fn active_room_by_code(&mut self, code: &str) -> LedgerResult<Option<Room>> {
        Ok(self
            .work
            .rooms
            .values()
            .find(|r| r.code == code && r.is_active())
            .cloned())
    }

    async fn active_room_ids(&mut self) -> LedgerResult<Vec<RoomId>> {
        Ok(self
            .work
            .rooms
            .values()
            .filter(|r| r.is_active())
            .map(|r| r.id)
            .collect())
    }

    async fn mark_dissolved(&mut self, room_id: RoomId, at: DateTime<Utc>) -> LedgerResult<bool> {
        match self.work.rooms.get_mut(&room_id) {
            Some(room) if room.is_active() => {
                room.status = RoomStatus::Dissolved;
                room.dissolved_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_membership(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> LedgerResult<Membership> {
        let membership = Membership {
            id: self.work.next_id(),
            room_id,
            user_id,
            joined_at,
            left_at: None,
            status: MemberStatus::Online,
        };
        self.work.memberships.push(membership.clone());
        Ok(membership)
    }

    async fn open_membership(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
    ) -> LedgerResult<Option<Membership>> {
        Ok(self
            .work
            .memberships
            .iter()
            .find(|m| m.room_id == room_id && m.user_id == user_id && m.is_open())
            .cloned())
    }

    async fn latest_membership(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
    ) -> LedgerResult<Option<Membership>> {
        Ok(self
            .work
            .memberships
            .iter()
            .filter(|m| m.room_id == room_id && m.user_id == user_id)
            .max_by_key(|m| (m.joined_at, m.id))
            .cloned())
    }

    async fn latest_open_membership_of(
        &mut self,
        user_id: UserId,
    ) -> LedgerResult<Option<Membership>> {
        Ok(self
            .work
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.is_open())
            .max_by_key(|m| (m.joined_at, m.id))
            .cloned())
    }

    async fn open_memberships(&mut self, room_id: RoomId) -> LedgerResult<Vec<Membership>> {
        let mut open: Vec<Membership> = self
            .work
            .memberships
            .iter()
            .filter(|m| m.room_id == room_id && m.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|m| (m.joined_at, m.id));
        Ok(open)
    }

    async fn set_member_status(
        &mut self,
        membership_id: i64,
        status: MemberStatus,
    ) -> LedgerResult<()> {
        if let Some(m) = self
            .work
            .memberships
            .iter_mut()
            .find(|m| m.id == membership_id)
        {
            m.status = status;
        }
        Ok(())
    }

    async fn close_memberships(&mut self, room_id: RoomId, at: DateTime<Utc>) -> LedgerResult<u64> {
        let mut closed = 0;
        for m in self
            .work
            .memberships
            .iter_mut()
            .filter(|m| m.room_id == room_id && m.left_at.is_none())
        {
            m.left_at = Some(at);
            m.status = MemberStatus::Offline;
            closed += 1;
        }
        Ok(closed)
    }

    async fn ensure_balance(&mut self, room_id: RoomId, user_id: UserId) -> LedgerResult<()> {
        self.work.balances.entry((room_id, user_id)).or_insert(0);
        Ok(())
    }

    async fn add_balance(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        delta: i64,
    ) -> LedgerResult<Option<i64>> {
        Ok(self.work.balances.get_mut(&(room_id, user_id)).map(|b| {
            *b += delta;
            *b
        }))
    }

    async fn balance(&mut self, room_id: RoomId, user_id: UserId) -> LedgerResult<Option<i64>> {
        Ok(self.work.balances.get(&(room_id, user_id)).copied())
    }

    async fn balances(&mut self, room_id: RoomId) -> LedgerResult<Vec<MemberBalance>> {
        Ok(self
            .work
            .balances
            .range((room_id, UserId::MIN)..=(room_id, UserId::MAX))
            .map(|(&(_, user_id), &balance)| MemberBalance { user_id, balance })
            .collect())
    }

    async fn zero_balances(&mut self, room_id: RoomId) -> LedgerResult<u64> {
        let mut zeroed = 0;
        for (_, balance) in self
            .work
            .balances
            .range_mut((room_id, UserId::MIN)..=(room_id, UserId::MAX))
        {
            *balance = 0;
            zeroed += 1;
        }
        Ok(zeroed)
    }

    async fn append_operation(&mut self, op: &NewOperation) -> LedgerResult<OperationRecord> {
        let record = OperationRecord {
            id: self.work.next_id(),
            room_id: op.room_id,
            user_id: op.user_id,
            kind: op.kind,
            amount: op.amount,
            target_user_id: op.target_user_id,
            description: op.description.clone(),
            created_at: op.created_at,
        };
        self.work.operations.push(record.clone());
        Ok(record)
    }

    async fn sum_amounts(
        &mut self,
        room_id: RoomId,
        kinds: &[OperationKind],
    ) -> LedgerResult<i64> {
        Ok(self
            .work
            .room_operations(room_id, None)
            .filter(|op| kinds.contains(&op.kind))
            .filter_map(|op| op.amount)
            .sum())
    }

    async fn latest_operation_at(
        &mut self,
        room_id: RoomId,
        kinds: &[OperationKind],
    ) -> LedgerResult<Option<DateTime<Utc>>> {
        Ok(self
            .work
            .room_operations(room_id, None)
            .filter(|op| kinds.contains(&op.kind))
            .map(|op| op.created_at)
            .max())
    }

    async fn operations(
        &mut self,
        room_id: RoomId,
        since: Option<DateTime<Utc>>,
        limit: Option<i64>,
        offset: i64,
    ) -> LedgerResult<Vec<OperationRecord>> {
        let mut ops: Vec<OperationRecord> =
            self.work.room_operations(room_id, since).cloned().collect();
        ops.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let offset = usize::try_from(offset).unwrap_or(0);
        let limit = limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);
        Ok(ops.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_operations(
        &mut self,
        room_id: RoomId,
        since: Option<DateTime<Utc>>,
    ) -> LedgerResult<i64> {
        Ok(self.work.room_operations(room_id, since).count() as i64)
    }

    async fn recent_amounts(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        kinds: &[OperationKind],
        limit: i64,
    ) -> LedgerResult<Vec<i64>> {
        let mut ops: Vec<&OperationRecord> = self
            .work
            .room_operations(room_id, None)
            .filter(|op| op.user_id == user_id && kinds.contains(&op.kind))
            .collect();
        ops.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        Ok(ops
            .into_iter()
            .filter_map(|op| op.amount)
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn insert_bet_record(&mut self, record: &NewBetRecord) -> LedgerResult<BetRecord> {
        let record = BetRecord {
            id: self.work.next_id(),
            room_id: record.room_id,
            from_user_id: record.from_user_id,
            to_user_id: record.to_user_id,
            amount: record.amount,
            created_at: record.created_at,
        };
        self.work.bet_records.push(record.clone());
        Ok(record)
    }

    async fn bet_records(&mut self, room_id: RoomId) -> LedgerResult<Vec<BetRecord>> {
        Ok(self
            .work
            .bet_records
            .iter()
            .filter(|r| r.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn insert_settlement(
        &mut self,
        record: &NewSettlement,
    ) -> LedgerResult<SettlementRecord> {
        let record = SettlementRecord {
            id: self.work.next_id(),
            room_id: record.room_id,
            user_id: record.user_id,
            chip_amount: record.chip_amount,
            rmb_amount: record.rmb_amount,
            settled_at: record.settled_at,
            batch: record.batch.clone(),
        };
        self.work.settlements.push(record.clone());
        Ok(record)
    }

    async fn settlements(&mut self, room_id: RoomId) -> LedgerResult<Vec<SettlementRecord>> {
        Ok(self
            .work
            .settlements
            .iter()
            .filter(|s| s.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let MemoryLedgerTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
