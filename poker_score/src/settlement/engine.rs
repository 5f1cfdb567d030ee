//! Two-phase settlement: an advisory proposal, then a committed batch.

use super::models::{NewSettlement, SettlementDetail, SettlementProposal, SettlementReceipt};
use super::plan::generate_plan;
use super::rate::calculate_rmb_amount;
use crate::hub::{HubHandle, RoomEvent};
use crate::ledger::{
    LedgerError, LedgerResult, NewOperation, OperationKind, require_active_room, require_member,
    table_balance_in,
};
use crate::room::{Room, RoomId, UserId};
use crate::settlement::SettlementRecord;
use crate::store::{LedgerStore, LedgerTx};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Fail with `PotNotZero` unless the pot is empty
pub(crate) async fn require_empty_pot(tx: &mut dyn LedgerTx, room_id: RoomId) -> LedgerResult<()> {
    let pot = table_balance_in(tx, room_id).await?;
    if pot != 0 {
        return Err(LedgerError::PotNotZero { pot });
    }
    Ok(())
}

/// Write one settlement row per non-zero balance and zero every balance
///
/// Shared by manual confirmation and automatic dissolution. `settled_at`
/// stamps the settlement rows, `recorded_at` the audit entry.
pub(crate) async fn settle_in_tx(
    tx: &mut dyn LedgerTx,
    room: &Room,
    actor_id: UserId,
    batch: String,
    settled_at: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
) -> LedgerResult<SettlementReceipt> {
    let balances = tx.balances(room.id).await?;

    let mut details = Vec::new();
    for entry in balances.iter().filter(|b| b.balance != 0) {
        let rmb_amount = calculate_rmb_amount(entry.balance, &room.chip_rate);
        tx.insert_settlement(&NewSettlement {
            room_id: room.id,
            user_id: entry.user_id,
            chip_amount: entry.balance,
            rmb_amount,
            settled_at,
            batch: batch.clone(),
        })
        .await?;
        details.push(SettlementDetail {
            user_id: entry.user_id,
            chip_amount: entry.balance,
            rmb_amount,
        });
    }

    tx.zero_balances(room.id).await?;

    let description = json!({
        "batch": batch,
        "settled_at": settled_at,
        "chip_rate": room.chip_rate,
        "details": details,
    });
    tx.append_operation(
        &NewOperation::new(
            room.id,
            actor_id,
            OperationKind::SettlementConfirmed,
            recorded_at,
        )
        .description(description.to_string()),
    )
    .await?;

    Ok(SettlementReceipt {
        room_id: room.id,
        batch,
        settled_at,
        chip_rate: room.chip_rate.clone(),
        details,
    })
}

/// Fresh id for a manually confirmed batch
pub(crate) fn manual_batch_id() -> String {
    Uuid::new_v4().to_string()
}

/// Proposes and confirms room settlements
#[derive(Clone)]
pub struct SettlementEngine {
    store: Arc<dyn LedgerStore>,
    hub: HubHandle,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn LedgerStore>, hub: HubHandle) -> Self {
        Self { store, hub }
    }

    /// Compute and broadcast a transfer plan without moving any chips
    ///
    /// Only an audit entry is written.
    ///
    /// # Errors
    ///
    /// `PotNotZero`, `NotAMember`, `RoomNotFound`, `RoomDissolved`
    pub async fn propose(
        &self,
        room_id: RoomId,
        actor_id: UserId,
    ) -> LedgerResult<SettlementProposal> {
        let mut tx = self.store.begin().await?;
        let room = require_active_room(tx.as_mut(), room_id, false).await?;
        require_member(tx.as_mut(), room_id, actor_id).await?;
        require_empty_pot(tx.as_mut(), room_id).await?;

        let balances = tx.balances(room_id).await?;
        let plan = generate_plan(&balances, &room.chip_rate);

        let now = Utc::now();
        tx.append_operation(
            &NewOperation::new(room_id, actor_id, OperationKind::SettlementInitiated, now)
                .description(format!("proposed settlement with {} transfers", plan.len())),
        )
        .await?;
        tx.commit().await?;

        log::info!(
            "Room {}: user {} proposed settlement ({} transfers)",
            room_id,
            actor_id,
            plan.len()
        );

        let proposal = SettlementProposal {
            room_id,
            initiated_by: actor_id,
            initiated_at: now,
            plan,
            table_balance: 0,
        };

        self.hub
            .publish(
                room_id,
                &RoomEvent::SettlementInitiated {
                    initiated_by: actor_id,
                    initiated_at: now,
                    settlement_plan: proposal.plan.clone(),
                    table_balance: 0,
                },
            )
            .await;

        Ok(proposal)
    }

    /// Convert every balance to currency and zero the room
    ///
    /// The pot is re-checked here; a proposal made earlier guarantees nothing.
    ///
    /// # Errors
    ///
    /// `PotNotZero`, `NotAMember`, `RoomNotFound`, `RoomDissolved`
    pub async fn confirm(
        &self,
        room_id: RoomId,
        actor_id: UserId,
    ) -> LedgerResult<SettlementReceipt> {
        let mut tx = self.store.begin().await?;
        let room = require_active_room(tx.as_mut(), room_id, true).await?;
        require_member(tx.as_mut(), room_id, actor_id).await?;
        require_empty_pot(tx.as_mut(), room_id).await?;

        let now = Utc::now();
        let receipt = settle_in_tx(tx.as_mut(), &room, actor_id, manual_batch_id(), now, now).await?;
        tx.commit().await?;

        log::info!(
            "Room {}: user {} confirmed settlement batch {} ({} members)",
            room_id,
            actor_id,
            receipt.batch,
            receipt.details.len()
        );

        self.publish_confirmed(room_id, actor_id, &receipt).await;

        Ok(receipt)
    }

    pub(crate) async fn publish_confirmed(
        &self,
        room_id: RoomId,
        actor_id: UserId,
        receipt: &SettlementReceipt,
    ) {
        self.hub
            .publish(
                room_id,
                &RoomEvent::SettlementConfirmed {
                    confirmed_by: actor_id,
                    settlement_batch: receipt.batch.clone(),
                    settled_at: receipt.settled_at,
                    details: receipt.details.clone(),
                },
            )
            .await;
    }

    /// Settlement rows of a room, oldest first
    pub async fn settlements(&self, room_id: RoomId) -> LedgerResult<Vec<SettlementRecord>> {
        let mut tx = self.store.begin().await?;
        tx.settlements(room_id).await
    }
}
