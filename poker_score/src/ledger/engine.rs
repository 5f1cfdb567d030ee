//! Room ledger engine.
//!
//! Each operation is one transaction: validate, move chips with an atomic
//! balance increment, append the audit entry, recompute the pot from the log,
//! commit, then broadcast.

use super::errors::{LedgerError, LedgerResult};
use super::models::{
    BetOutcome, HistoryAmounts, NewBetRecord, NewOperation, NiuniuBetItem, NiuniuBetOutcome,
    OperationKind, TransferOutcome, WithdrawOutcome, pot_from_totals,
};
use crate::hub::{HubHandle, RoomEvent};
use crate::room::{Membership, Room, RoomId, UserId};
use crate::store::{LedgerStore, LedgerTx};
use chrono::Utc;
use std::sync::Arc;

/// Quick-amount history depth
const HISTORY_DEPTH: i64 = 6;

/// Pot of a room as derived from its operation log
pub(crate) async fn table_balance_in(tx: &mut dyn LedgerTx, room_id: RoomId) -> LedgerResult<i64> {
    let bets = tx.sum_amounts(room_id, OperationKind::BET_KINDS).await?;
    let withdrawals = tx
        .sum_amounts(room_id, OperationKind::WITHDRAW_KINDS)
        .await?;
    Ok(pot_from_totals(bets, withdrawals))
}

/// Load an active room, optionally holding its row lock
pub(crate) async fn require_active_room(
    tx: &mut dyn LedgerTx,
    room_id: RoomId,
    lock: bool,
) -> LedgerResult<Room> {
    let room = if lock {
        tx.lock_room(room_id).await?
    } else {
        tx.room(room_id).await?
    };

    match room {
        Some(room) if room.is_active() => Ok(room),
        Some(_) => Err(LedgerError::RoomDissolved(room_id)),
        None => Err(LedgerError::RoomNotFound(room_id)),
    }
}

pub(crate) async fn require_member(
    tx: &mut dyn LedgerTx,
    room_id: RoomId,
    user_id: UserId,
) -> LedgerResult<Membership> {
    tx.open_membership(room_id, user_id)
        .await?
        .ok_or(LedgerError::NotAMember { room_id, user_id })
}

/// Add `delta` to a member's balance
async fn credit(
    tx: &mut dyn LedgerTx,
    room_id: RoomId,
    user_id: UserId,
    delta: i64,
) -> LedgerResult<i64> {
    tx.add_balance(room_id, user_id, delta)
        .await?
        .ok_or(LedgerError::NotAMember { room_id, user_id })
}

/// Applies chip operations to rooms
#[derive(Clone)]
pub struct RoomLedger {
    store: Arc<dyn LedgerStore>,
    hub: HubHandle,
}

impl RoomLedger {
    pub fn new(store: Arc<dyn LedgerStore>, hub: HubHandle) -> Self {
        Self { store, hub }
    }

    /// Put chips into the pot
    ///
    /// # Arguments
    ///
    /// * `room_id` - Room ID
    /// * `user_id` - Betting member
    /// * `amount` - Chips to bet, must be positive
    ///
    /// # Returns
    ///
    /// * `LedgerResult<BetOutcome>` - New personal balance and pot
    ///
    /// # Errors
    ///
    /// `InvalidAmount`, `NotAMember`, `RoomNotFound`, `RoomDissolved`
    pub async fn bet(&self, room_id: RoomId, user_id: UserId, amount: i64) -> LedgerResult<BetOutcome> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut tx = self.store.begin().await?;
        // Room lock first, before any balance row, as settlement and dissolution do
        require_active_room(tx.as_mut(), room_id, true).await?;
        require_member(tx.as_mut(), room_id, user_id).await?;

        let now = Utc::now();
        let balance = credit(tx.as_mut(), room_id, user_id, -amount).await?;
        tx.append_operation(
            &NewOperation::new(room_id, user_id, OperationKind::Bet, now)
                .amount(amount)
                .description(format!("bet {} chips", amount)),
        )
        .await?;
        let table_balance = table_balance_in(tx.as_mut(), room_id).await?;
        tx.commit().await?;

        log::info!(
            "Room {}: user {} bet {} (balance {}, pot {})",
            room_id,
            user_id,
            amount,
            balance,
            table_balance
        );

        self.hub
            .publish(
                room_id,
                &RoomEvent::Bet {
                    user_id,
                    amount,
                    balance,
                    table_balance,
                    created_at: now,
                },
            )
            .await;

        Ok(BetOutcome {
            balance,
            table_balance,
        })
    }

    /// Take chips out of the pot
    ///
    /// `amount <= 0` withdraws the whole pot.
    ///
    /// # Errors
    ///
    /// `PotEmpty`, `ExceedsPot`, `NotAMember`, `RoomNotFound`, `RoomDissolved`
    pub async fn withdraw(
        &self,
        room_id: RoomId,
        user_id: UserId,
        amount: i64,
    ) -> LedgerResult<WithdrawOutcome> {
        let mut tx = self.store.begin().await?;
        require_active_room(tx.as_mut(), room_id, true).await?;
        require_member(tx.as_mut(), room_id, user_id).await?;

        let pot = table_balance_in(tx.as_mut(), room_id).await?;
        if pot <= 0 {
            return Err(LedgerError::PotEmpty);
        }

        let actual = if amount <= 0 {
            pot
        } else if amount > pot {
            return Err(LedgerError::ExceedsPot {
                requested: amount,
                available: pot,
            });
        } else {
            amount
        };

        let now = Utc::now();
        let balance = credit(tx.as_mut(), room_id, user_id, actual).await?;
        tx.append_operation(
            &NewOperation::new(room_id, user_id, OperationKind::Withdraw, now)
                .amount(actual)
                .description(format!("withdrew {} chips", actual)),
        )
        .await?;
        let table_balance = table_balance_in(tx.as_mut(), room_id).await?;
        tx.commit().await?;

        log::info!(
            "Room {}: user {} withdrew {} (balance {}, pot {})",
            room_id,
            user_id,
            actual,
            balance,
            table_balance
        );

        self.hub
            .publish(
                room_id,
                &RoomEvent::Withdraw {
                    user_id,
                    amount: actual,
                    balance,
                    table_balance,
                    created_at: now,
                },
            )
            .await;

        Ok(WithdrawOutcome {
            balance,
            table_balance,
            amount: actual,
        })
    }

    /// Move the entire pot to `target_id`
    ///
    /// # Errors
    ///
    /// `NotAMember` for actor or target, `PotEmpty`, `RoomNotFound`, `RoomDissolved`
    pub async fn force_transfer(
        &self,
        room_id: RoomId,
        actor_id: UserId,
        target_id: UserId,
    ) -> LedgerResult<TransferOutcome> {
        let mut tx = self.store.begin().await?;
        require_active_room(tx.as_mut(), room_id, true).await?;
        require_member(tx.as_mut(), room_id, actor_id).await?;
        require_member(tx.as_mut(), room_id, target_id).await?;

        let pot = table_balance_in(tx.as_mut(), room_id).await?;
        if pot <= 0 {
            return Err(LedgerError::PotEmpty);
        }

        let now = Utc::now();
        let target_balance = credit(tx.as_mut(), room_id, target_id, pot).await?;
        let actor_balance = tx
            .balance(room_id, actor_id)
            .await?
            .ok_or(LedgerError::NotAMember {
                room_id,
                user_id: actor_id,
            })?;
        tx.append_operation(
            &NewOperation::new(room_id, actor_id, OperationKind::ForceTransfer, now)
                .amount(pot)
                .target(target_id)
                .description(format!("moved the pot of {} chips to user {}", pot, target_id)),
        )
        .await?;
        let table_balance = table_balance_in(tx.as_mut(), room_id).await?;
        tx.commit().await?;

        log::info!(
            "Room {}: user {} moved pot {} to user {}",
            room_id,
            actor_id,
            pot,
            target_id
        );

        self.hub
            .publish(
                room_id,
                &RoomEvent::ForceTransfer {
                    user_id: actor_id,
                    target_user_id: target_id,
                    amount: pot,
                    balance: actor_balance,
                    target_balance,
                    table_balance,
                    created_at: now,
                },
            )
            .await;

        Ok(TransferOutcome {
            actor_balance,
            target_balance,
            table_balance,
            amount: pot,
        })
    }

    /// Bet on several opponents at once
    ///
    /// Entries are validated before anything is written; the bettor is debited
    /// the total in one step and each entry is kept as a targeted-bet record.
    ///
    /// # Errors
    ///
    /// `InvalidBet`, `NotAMember`, `RoomNotFound`, `RoomDissolved`
    pub async fn niuniu_bet(
        &self,
        room_id: RoomId,
        user_id: UserId,
        bets: &[NiuniuBetItem],
    ) -> LedgerResult<NiuniuBetOutcome> {
        let total_amount = validate_niuniu_bets(bets)?;

        let mut tx = self.store.begin().await?;
        // Room lock first, before any balance row, as settlement and dissolution do
        require_active_room(tx.as_mut(), room_id, true).await?;
        require_member(tx.as_mut(), room_id, user_id).await?;

        let now = Utc::now();
        for bet in bets {
            tx.insert_bet_record(&NewBetRecord {
                room_id,
                from_user_id: user_id,
                to_user_id: bet.to_user_id,
                amount: bet.amount,
                created_at: now,
            })
            .await?;
        }

        let balance = credit(tx.as_mut(), room_id, user_id, -total_amount).await?;
        tx.append_operation(
            &NewOperation::new(room_id, user_id, OperationKind::NiuniuBet, now)
                .amount(total_amount)
                .description(serde_json::to_string(bets)?),
        )
        .await?;
        let table_balance = table_balance_in(tx.as_mut(), room_id).await?;
        tx.commit().await?;

        log::info!(
            "Room {}: user {} placed {} niuniu bets totalling {}",
            room_id,
            user_id,
            bets.len(),
            total_amount
        );

        self.hub
            .publish(
                room_id,
                &RoomEvent::NiuniuBet {
                    user_id,
                    total_amount,
                    balance,
                    table_balance,
                    bets: bets.to_vec(),
                    created_at: now,
                },
            )
            .await;

        Ok(NiuniuBetOutcome {
            balance,
            total_amount,
            table_balance,
        })
    }

    /// Current pot of a room
    pub async fn table_balance(&self, room_id: RoomId) -> LedgerResult<i64> {
        let mut tx = self.store.begin().await?;
        if tx.room(room_id).await?.is_none() {
            return Err(LedgerError::RoomNotFound(room_id));
        }
        table_balance_in(tx.as_mut(), room_id).await
    }

    /// Current balance of a user in a room
    pub async fn balance(&self, room_id: RoomId, user_id: UserId) -> LedgerResult<i64> {
        let mut tx = self.store.begin().await?;
        tx.balance(room_id, user_id)
            .await?
            .ok_or(LedgerError::NotAMember { room_id, user_id })
    }

    /// The six most recent bet and withdraw amounts of a user, newest first
    pub async fn history_amounts(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> LedgerResult<HistoryAmounts> {
        let mut tx = self.store.begin().await?;
        let bets = tx
            .recent_amounts(room_id, user_id, OperationKind::BET_KINDS, HISTORY_DEPTH)
            .await?;
        let withdrawals = tx
            .recent_amounts(room_id, user_id, &[OperationKind::Withdraw], HISTORY_DEPTH)
            .await?;

        Ok(HistoryAmounts { bets, withdrawals })
    }
}

/// Check every entry and return the total
fn validate_niuniu_bets(bets: &[NiuniuBetItem]) -> LedgerResult<i64> {
    if bets.is_empty() {
        return Err(LedgerError::InvalidBet("no bets given".to_string()));
    }

    let mut total: i64 = 0;
    for bet in bets {
        if bet.to_user_id == 0 {
            return Err(LedgerError::InvalidBet("bet target is missing".to_string()));
        }
        if bet.amount <= 0 {
            return Err(LedgerError::InvalidBet(format!(
                "amount for user {} must be positive, got {}",
                bet.to_user_id, bet.amount
            )));
        }
        total = total
            .checked_add(bet.amount)
            .ok_or_else(|| LedgerError::InvalidBet("total amount overflows".to_string()))?;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(to_user_id: UserId, amount: i64) -> NiuniuBetItem {
        NiuniuBetItem { to_user_id, amount }
    }

    #[test]
    fn test_validate_niuniu_bets_totals_entries() {
        assert_eq!(validate_niuniu_bets(&[item(2, 50), item(3, 70)]).unwrap(), 120);
    }

    #[test]
    fn test_validate_niuniu_bets_rejects_bad_entries() {
        assert!(matches!(
            validate_niuniu_bets(&[]),
            Err(LedgerError::InvalidBet(_))
        ));
        assert!(matches!(
            validate_niuniu_bets(&[item(2, 50), item(0, 10)]),
            Err(LedgerError::InvalidBet(_))
        ));
        assert!(matches!(
            validate_niuniu_bets(&[item(2, 50), item(3, -1)]),
            Err(LedgerError::InvalidBet(_))
        ));
        assert!(matches!(
            validate_niuniu_bets(&[item(2, i64::MAX), item(3, 1)]),
            Err(LedgerError::InvalidBet(_))
        ));
    }
}
