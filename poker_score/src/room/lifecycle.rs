//! Room dissolution: manual, and automatic after inactivity.

use super::manager::RoomManager;
use super::models::{RoomId, SYSTEM_USER_ID, SweepReport, UserId};
use crate::hub::RoomEvent;
use crate::ledger::{
    LedgerError, LedgerResult, NewOperation, OperationKind, require_active_room, require_member,
    table_balance_in,
};
use crate::room::MemberBalance;
use crate::settlement::{
    AUTO_BATCH_PREFIX, SettlementReceipt, manual_batch_id, require_empty_pot, settle_in_tx,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Highest balance wins, lowest user id on ties
fn pot_winner(balances: &[MemberBalance]) -> Option<UserId> {
    balances
        .iter()
        .min_by_key(|b| (std::cmp::Reverse(b.balance), b.user_id))
        .map(|b| b.user_id)
}

impl RoomManager {
    /// Settle and close a room on a member's request
    ///
    /// Runs a settlement confirmation in the same transaction, then flips the
    /// room to dissolved and closes every open membership.
    ///
    /// # Errors
    ///
    /// `PotNotZero`, `NotAMember`, `RoomNotFound`, `RoomDissolved`
    pub async fn dissolve(&self, room_id: RoomId, actor_id: UserId) -> LedgerResult<DateTime<Utc>> {
        let mut tx = self.store.begin().await?;
        let room = require_active_room(tx.as_mut(), room_id, true).await?;
        require_member(tx.as_mut(), room_id, actor_id).await?;
        require_empty_pot(tx.as_mut(), room_id).await?;

        let now = Utc::now();
        let receipt =
            settle_in_tx(tx.as_mut(), &room, actor_id, manual_batch_id(), now, now).await?;
        if !tx.mark_dissolved(room_id, now).await? {
            return Err(LedgerError::RoomDissolved(room_id));
        }
        tx.close_memberships(room_id, now).await?;
        tx.commit().await?;

        log::info!(
            "Room {} dissolved by user {} (batch {})",
            room_id,
            actor_id,
            receipt.batch
        );

        self.settlement
            .publish_confirmed(room_id, actor_id, &receipt)
            .await;
        self.hub
            .publish(
                room_id,
                &RoomEvent::RoomDissolved {
                    room_id,
                    dissolved_at: now,
                    settlement_batch: Some(receipt.batch),
                },
            )
            .await;

        Ok(now)
    }

    /// Auto-settle and close the room if it has been quiet for too long
    ///
    /// A room is quiet when its latest financial operation, or its creation
    /// if it has none, is at least the inactivity threshold before `now`.
    /// A remaining pot goes to the member with the highest balance. The
    /// settlement rows are backdated to the last activity.
    ///
    /// Returns `None` when the room is recent, unknown or already dissolved.
    pub async fn dissolve_if_inactive(
        &self,
        room_id: RoomId,
        now: DateTime<Utc>,
    ) -> LedgerResult<Option<SettlementReceipt>> {
        let mut tx = self.store.begin().await?;
        let Some(room) = tx.lock_room(room_id).await? else {
            return Ok(None);
        };
        if !room.is_active() {
            return Ok(None);
        }

        let last_activity = tx
            .latest_operation_at(room_id, OperationKind::FINANCIAL_KINDS)
            .await?
            .unwrap_or(room.created_at);
        if last_activity > now - self.config.inactivity_threshold {
            return Ok(None);
        }
        let settled_at = last_activity.min(now);

        if !tx.mark_dissolved(room_id, now).await? {
            return Ok(None);
        }

        let pot = table_balance_in(tx.as_mut(), room_id).await?;
        let mut award = None;
        if pot > 0 {
            let balances = tx.balances(room_id).await?;
            if let Some(winner) = pot_winner(&balances) {
                tx.add_balance(room_id, winner, pot).await?;
                tx.append_operation(
                    &NewOperation::new(room_id, SYSTEM_USER_ID, OperationKind::ForceTransfer, now)
                        .amount(pot)
                        .target(winner)
                        .description(format!(
                            "inactive room: pot of {} chips awarded to user {}",
                            pot, winner
                        )),
                )
                .await?;
                award = Some((winner, pot));
            }
        }

        let batch = format!("{}{}", AUTO_BATCH_PREFIX, Uuid::new_v4());
        let receipt =
            settle_in_tx(tx.as_mut(), &room, SYSTEM_USER_ID, batch, settled_at, now).await?;
        tx.close_memberships(room_id, now).await?;
        tx.commit().await?;

        match award {
            Some((winner, pot)) => log::info!(
                "Room {} auto-dissolved after inactivity, pot {} awarded to user {} (batch {})",
                room_id,
                pot,
                winner,
                receipt.batch
            ),
            None => log::info!(
                "Room {} auto-dissolved after inactivity (batch {})",
                room_id,
                receipt.batch
            ),
        }

        self.hub
            .publish(
                room_id,
                &RoomEvent::RoomDissolved {
                    room_id,
                    dissolved_at: now,
                    settlement_batch: Some(receipt.batch.clone()),
                },
            )
            .await;

        Ok(Some(receipt))
    }

    /// Check every active room once
    ///
    /// A failure in one room is logged and does not stop the sweep.
    pub async fn sweep_inactive(&self, now: DateTime<Utc>) -> LedgerResult<SweepReport> {
        let room_ids = {
            let mut tx = self.store.begin().await?;
            tx.active_room_ids().await?
        };

        let mut report = SweepReport {
            inspected: room_ids.len(),
            ..SweepReport::default()
        };

        for room_id in room_ids {
            match self.dissolve_if_inactive(room_id, now).await {
                Ok(Some(_)) => report.dissolved.push(room_id),
                Ok(None) => {}
                Err(e) => {
                    log::error!("Room {}: inactivity sweep failed: {}", room_id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run `sweep_inactive` every check period until the task is aborted
    pub fn spawn_inactivity_watcher(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.check_period);
            log::info!(
                "Inactivity watcher started (threshold {}h, every {:?})",
                self.config.inactivity_threshold.num_hours(),
                self.config.check_period
            );

            loop {
                ticker.tick().await;

                match self.sweep_inactive(Utc::now()).await {
                    Ok(report) if !report.dissolved.is_empty() || report.failed > 0 => {
                        log::info!(
                            "Inactivity sweep: {} rooms checked, {} dissolved, {} failed",
                            report.inspected,
                            report.dissolved.len(),
                            report.failed
                        );
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Inactivity sweep could not list rooms: {}", e),
                }
            }
        })
    }
}
