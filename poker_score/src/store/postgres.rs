//! PostgreSQL ledger store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::{LedgerStore, LedgerTx};
use crate::ledger::{
    BetRecord, LedgerResult, NewBetRecord, NewOperation, OperationKind, OperationRecord,
};
use crate::room::{
    GameVariant, MemberBalance, MemberStatus, Membership, NewRoom, Room, RoomId, RoomStatus,
    UserId,
};
use crate::settlement::{NewSettlement, SettlementRecord};

const ROOM_COLUMNS: &str =
    "id, code, variant, chip_rate, status, created_by, created_at, dissolved_at";
const MEMBER_COLUMNS: &str = "id, room_id, user_id, joined_at, left_at, status";
const OPERATION_COLUMNS: &str =
    "id, room_id, user_id, kind, amount, target_user_id, description, created_at";

fn kind_names(kinds: &[OperationKind]) -> Vec<String> {
    kinds.iter().map(|k| k.as_str().to_string()).collect()
}

fn room_from_row(row: &PgRow) -> Room {
    Room {
        id: row.get("id"),
        code: row.get("code"),
        variant: GameVariant::from_db(row.get::<&str, _>("variant")),
        chip_rate: row.get("chip_rate"),
        status: RoomStatus::from_db(row.get::<&str, _>("status")),
        created_by: row.get("created_by"),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
        dissolved_at: row
            .get::<Option<NaiveDateTime>, _>("dissolved_at")
            .map(|t| t.and_utc()),
    }
}

fn membership_from_row(row: &PgRow) -> Membership {
    Membership {
        id: row.get("id"),
        room_id: row.get("room_id"),
        user_id: row.get("user_id"),
        joined_at: row.get::<NaiveDateTime, _>("joined_at").and_utc(),
        left_at: row
            .get::<Option<NaiveDateTime>, _>("left_at")
            .map(|t| t.and_utc()),
        status: MemberStatus::from_db(row.get::<&str, _>("status")),
    }
}

fn operation_from_row(row: &PgRow) -> LedgerResult<OperationRecord> {
    let kind: String = row.get("kind");
    let kind = OperationKind::from_db(&kind).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown operation kind {:?}", kind).into())
    })?;

    Ok(OperationRecord {
        id: row.get("id"),
        room_id: row.get("room_id"),
        user_id: row.get("user_id"),
        kind,
        amount: row.get("amount"),
        target_user_id: row.get("target_user_id"),
        description: row.get("description"),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
    })
}

fn settlement_from_row(row: &PgRow) -> SettlementRecord {
    SettlementRecord {
        id: row.get("id"),
        room_id: row.get("room_id"),
        user_id: row.get("user_id"),
        chip_amount: row.get("chip_amount"),
        rmb_amount: row.get("rmb_amount"),
        settled_at: row.get::<NaiveDateTime, _>("settled_at").and_utc(),
        batch: row.get("settlement_batch"),
    }
}

fn bet_record_from_row(row: &PgRow) -> BetRecord {
    BetRecord {
        id: row.get("id"),
        room_id: row.get("room_id"),
        from_user_id: row.get("from_user_id"),
        to_user_id: row.get("to_user_id"),
        amount: row.get("amount"),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
    }
}

/// Ledger store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn health_check(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn insert_room(&mut self, room: &NewRoom) -> LedgerResult<Room> {
        let row = sqlx::query(&format!(
            "INSERT INTO rooms (code, variant, chip_rate, status, created_by, created_at)
             VALUES ($1, $2, $3, 'active', $4, $5)
             RETURNING {}",
            ROOM_COLUMNS
        ))
        .bind(&room.code)
        .bind(room.variant.as_str())
        .bind(&room.chip_rate)
        .bind(room.created_by)
        .bind(room.created_at.naive_utc())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(room_from_row(&row))
    }

    async fn room(&mut self, room_id: RoomId) -> LedgerResult<Option<Room>> {
        let row = sqlx::query(&format!("SELECT {} FROM rooms WHERE id = $1", ROOM_COLUMNS))
            .bind(room_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.as_ref().map(room_from_row))
    }

    async fn lock_room(&mut self, room_id: RoomId) -> LedgerResult<Option<Room>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM rooms WHERE id = $1 FOR UPDATE",
            ROOM_COLUMNS
        ))
        .bind(room_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(room_from_row))
    }

    async fn active_room_by_code(&mut self, code: &str) -> LedgerResult<Option<Room>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM rooms WHERE code = $1 AND status = 'active'",
            ROOM_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(room_from_row))
    }

    async fn active_room_ids(&mut self) -> LedgerResult<Vec<RoomId>> {
        let rows = sqlx::query("SELECT id FROM rooms WHERE status = 'active' ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    async fn mark_dissolved(&mut self, room_id: RoomId, at: DateTime<Utc>) -> LedgerResult<bool> {
        let result = sqlx::query(
            "UPDATE rooms SET status = 'dissolved', dissolved_at = $2
             WHERE id = $1 AND status = 'active'",
        )
        .bind(room_id)
        .bind(at.naive_utc())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_membership(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> LedgerResult<Membership> {
        let row = sqlx::query(&format!(
            "INSERT INTO room_members (room_id, user_id, joined_at, status)
             VALUES ($1, $2, $3, 'online')
             RETURNING {}",
            MEMBER_COLUMNS
        ))
        .bind(room_id)
        .bind(user_id)
        .bind(joined_at.naive_utc())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(membership_from_row(&row))
    }

    async fn open_membership(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
    ) -> LedgerResult<Option<Membership>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM room_members
             WHERE room_id = $1 AND user_id = $2 AND left_at IS NULL",
            MEMBER_COLUMNS
        ))
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(membership_from_row))
    }

    async fn latest_membership(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
    ) -> LedgerResult<Option<Membership>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM room_members
             WHERE room_id = $1 AND user_id = $2
             ORDER BY joined_at DESC, id DESC
             LIMIT 1",
            MEMBER_COLUMNS
        ))
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(membership_from_row))
    }

    async fn latest_open_membership_of(
        &mut self,
        user_id: UserId,
    ) -> LedgerResult<Option<Membership>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM room_members
             WHERE user_id = $1 AND left_at IS NULL
             ORDER BY joined_at DESC, id DESC
             LIMIT 1",
            MEMBER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(membership_from_row))
    }

    async fn open_memberships(&mut self, room_id: RoomId) -> LedgerResult<Vec<Membership>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM room_members
             WHERE room_id = $1 AND left_at IS NULL
             ORDER BY joined_at, id",
            MEMBER_COLUMNS
        ))
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(membership_from_row).collect())
    }

    async fn set_member_status(
        &mut self,
        membership_id: i64,
        status: MemberStatus,
    ) -> LedgerResult<()> {
        sqlx::query("UPDATE room_members SET status = $2 WHERE id = $1")
            .bind(membership_id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn close_memberships(&mut self, room_id: RoomId, at: DateTime<Utc>) -> LedgerResult<u64> {
        let result = sqlx::query(
            "UPDATE room_members SET left_at = $2, status = 'offline'
             WHERE room_id = $1 AND left_at IS NULL",
        )
        .bind(room_id)
        .bind(at.naive_utc())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn ensure_balance(&mut self, room_id: RoomId, user_id: UserId) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO user_balances (room_id, user_id, balance)
             VALUES ($1, $2, 0)
             ON CONFLICT (room_id, user_id) DO NOTHING",
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn add_balance(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        delta: i64,
    ) -> LedgerResult<Option<i64>> {
        let row = sqlx::query(
            "UPDATE user_balances
             SET balance = balance + $3, updated_at = NOW()
             WHERE room_id = $1 AND user_id = $2
             RETURNING balance",
        )
        .bind(room_id)
        .bind(user_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|r| r.get("balance")))
    }

    async fn balance(&mut self, room_id: RoomId, user_id: UserId) -> LedgerResult<Option<i64>> {
        let row = sqlx::query("SELECT balance FROM user_balances WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(|r| r.get("balance")))
    }

    async fn balances(&mut self, room_id: RoomId) -> LedgerResult<Vec<MemberBalance>> {
        let rows = sqlx::query(
            "SELECT user_id, balance FROM user_balances WHERE room_id = $1 ORDER BY user_id",
        )
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .iter()
            .map(|row| MemberBalance {
                user_id: row.get("user_id"),
                balance: row.get("balance"),
            })
            .collect())
    }

    async fn zero_balances(&mut self, room_id: RoomId) -> LedgerResult<u64> {
        let result = sqlx::query(
            "UPDATE user_balances SET balance = 0, updated_at = NOW() WHERE room_id = $1",
        )
        .bind(room_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn append_operation(&mut self, op: &NewOperation) -> LedgerResult<OperationRecord> {
        let row = sqlx::query(&format!(
            "INSERT INTO room_operations
             (room_id, user_id, kind, amount, target_user_id, description, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            OPERATION_COLUMNS
        ))
        .bind(op.room_id)
        .bind(op.user_id)
        .bind(op.kind.as_str())
        .bind(op.amount)
        .bind(op.target_user_id)
        .bind(&op.description)
        .bind(op.created_at.naive_utc())
        .fetch_one(&mut *self.tx)
        .await?;

        operation_from_row(&row)
    }

    async fn sum_amounts(
        &mut self,
        room_id: RoomId,
        kinds: &[OperationKind],
    ) -> LedgerResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT AS total
             FROM room_operations
             WHERE room_id = $1 AND kind = ANY($2)",
        )
        .bind(room_id)
        .bind(kind_names(kinds))
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.get("total"))
    }

    async fn latest_operation_at(
        &mut self,
        room_id: RoomId,
        kinds: &[OperationKind],
    ) -> LedgerResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT MAX(created_at) AS latest
             FROM room_operations
             WHERE room_id = $1 AND kind = ANY($2)",
        )
        .bind(room_id)
        .bind(kind_names(kinds))
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row
            .get::<Option<NaiveDateTime>, _>("latest")
            .map(|t| t.and_utc()))
    }

    async fn operations(
        &mut self,
        room_id: RoomId,
        since: Option<DateTime<Utc>>,
        limit: Option<i64>,
        offset: i64,
    ) -> LedgerResult<Vec<OperationRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM room_operations
             WHERE room_id = $1 AND ($2::TIMESTAMP IS NULL OR created_at >= $2)
             ORDER BY created_at DESC, id DESC
             LIMIT $3 OFFSET $4",
            OPERATION_COLUMNS
        ))
        .bind(room_id)
        .bind(since.map(|t| t.naive_utc()))
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(operation_from_row).collect()
    }

    async fn count_operations(
        &mut self,
        room_id: RoomId,
        since: Option<DateTime<Utc>>,
    ) -> LedgerResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM room_operations
             WHERE room_id = $1 AND ($2::TIMESTAMP IS NULL OR created_at >= $2)",
        )
        .bind(room_id)
        .bind(since.map(|t| t.naive_utc()))
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.get("total"))
    }

    async fn recent_amounts(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        kinds: &[OperationKind],
        limit: i64,
    ) -> LedgerResult<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT amount FROM room_operations
             WHERE room_id = $1 AND user_id = $2 AND kind = ANY($3) AND amount IS NOT NULL
             ORDER BY created_at DESC, id DESC
             LIMIT $4",
        )
        .bind(room_id)
        .bind(user_id)
        .bind(kind_names(kinds))
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(|row| row.get("amount")).collect())
    }

    async fn insert_bet_record(&mut self, record: &NewBetRecord) -> LedgerResult<BetRecord> {
        let row = sqlx::query(
            "INSERT INTO bet_records (room_id, from_user_id, to_user_id, amount, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, room_id, from_user_id, to_user_id, amount, created_at",
        )
        .bind(record.room_id)
        .bind(record.from_user_id)
        .bind(record.to_user_id)
        .bind(record.amount)
        .bind(record.created_at.naive_utc())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(bet_record_from_row(&row))
    }

    async fn bet_records(&mut self, room_id: RoomId) -> LedgerResult<Vec<BetRecord>> {
        let rows = sqlx::query(
            "SELECT id, room_id, from_user_id, to_user_id, amount, created_at
             FROM bet_records WHERE room_id = $1 ORDER BY id",
        )
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(bet_record_from_row).collect())
    }

    async fn insert_settlement(
        &mut self,
        record: &NewSettlement,
    ) -> LedgerResult<SettlementRecord> {
        let row = sqlx::query(
            "INSERT INTO settlements
             (room_id, user_id, chip_amount, rmb_amount, settled_at, settlement_batch)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, room_id, user_id, chip_amount, rmb_amount, settled_at, settlement_batch",
        )
        .bind(record.room_id)
        .bind(record.user_id)
        .bind(record.chip_amount)
        .bind(record.rmb_amount)
        .bind(record.settled_at.naive_utc())
        .bind(&record.batch)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(settlement_from_row(&row))
    }

    async fn settlements(&mut self, room_id: RoomId) -> LedgerResult<Vec<SettlementRecord>> {
        let rows = sqlx::query(
            "SELECT id, room_id, user_id, chip_amount, rmb_amount, settled_at, settlement_batch
             FROM settlements WHERE room_id = $1 ORDER BY id",
        )
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(settlement_from_row).collect())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
