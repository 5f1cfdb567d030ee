//! Room membership management.

use super::code::{generate_room_code, is_valid_room_code};
use super::config::LifecycleConfig;
use super::models::{
    GameVariant, MemberStatus, MemberView, Membership, NewRoom, OperationPage, Room,
    RoomDetails, RoomId, UserId,
};
use crate::hub::{HubHandle, RoomEvent};
use crate::ledger::{
    LedgerError, LedgerResult, NewOperation, OperationKind, require_active_room, require_member,
    table_balance_in,
};
use crate::settlement::{ChipRate, SettlementEngine};
use crate::store::{LedgerStore, LedgerTx};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Open a fresh membership with a zero balance and record the join
async fn join_in_tx(
    tx: &mut dyn LedgerTx,
    room_id: RoomId,
    user_id: UserId,
    now: DateTime<Utc>,
) -> LedgerResult<(Membership, i64)> {
    let membership = tx.insert_membership(room_id, user_id, now).await?;
    tx.ensure_balance(room_id, user_id).await?;
    tx.append_operation(
        &NewOperation::new(room_id, user_id, OperationKind::Join, now).description("joined the room"),
    )
    .await?;
    let balance = tx.balance(room_id, user_id).await?.unwrap_or(0);
    Ok((membership, balance))
}

/// Manages rooms, memberships and the room lifecycle
pub struct RoomManager {
    pub(super) store: Arc<dyn LedgerStore>,
    pub(super) hub: HubHandle,
    pub(super) settlement: SettlementEngine,
    pub(super) config: LifecycleConfig,
}

impl RoomManager {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        hub: HubHandle,
        settlement: SettlementEngine,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            hub,
            settlement,
            config,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Create a room with a fresh code and join the creator to it
    ///
    /// # Arguments
    ///
    /// * `user_id` - Creator
    /// * `variant` - Game played in the room
    /// * `chip_rate` - "chips:currency" rate used at settlement
    ///
    /// # Errors
    ///
    /// `RoomCodeExhausted` if no unused code was drawn
    pub async fn create_room(
        &self,
        user_id: UserId,
        variant: GameVariant,
        chip_rate: &str,
    ) -> LedgerResult<(Room, Membership)> {
        if ChipRate::parse(chip_rate).is_none() {
            log::warn!(
                "Creating room with unusable chip rate {:?}; settlements will convert to 0",
                chip_rate
            );
        }

        let mut tx = self.store.begin().await?;

        let mut code = None;
        for _ in 0..self.config.code_attempts {
            let candidate = generate_room_code();
            if tx.active_room_by_code(&candidate).await?.is_none() {
                code = Some(candidate);
                break;
            }
        }
        let code = code.ok_or(LedgerError::RoomCodeExhausted(self.config.code_attempts))?;

        let now = Utc::now();
        let room = tx
            .insert_room(&NewRoom {
                code,
                variant,
                chip_rate: chip_rate.to_string(),
                created_by: user_id,
                created_at: now,
            })
            .await?;
        tx.append_operation(
            &NewOperation::new(room.id, user_id, OperationKind::Create, now)
                .description(format!("created room {}", room.code)),
        )
        .await?;
        let (membership, _) = join_in_tx(tx.as_mut(), room.id, user_id, now).await?;
        tx.commit().await?;

        log::info!(
            "Room {} ({}) created by user {}",
            room.id,
            room.code,
            user_id
        );

        Ok((room, membership))
    }

    /// Join a room, or come back to an open membership
    ///
    /// An online member gets the existing membership back unchanged; an
    /// offline one is marked online again and recorded as a return.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `RoomDissolved`
    pub async fn join(&self, room_id: RoomId, user_id: UserId) -> LedgerResult<Membership> {
        let mut tx = self.store.begin().await?;
        require_active_room(tx.as_mut(), room_id, false).await?;

        if let Some(membership) = tx.open_membership(room_id, user_id).await? {
            if membership.status == MemberStatus::Online {
                return Ok(membership);
            }
            return self.mark_returned(tx, membership).await;
        }

        let now = Utc::now();
        let (membership, balance) = join_in_tx(tx.as_mut(), room_id, user_id, now).await?;
        tx.commit().await?;

        log::info!("Room {}: user {} joined", room_id, user_id);

        self.hub
            .publish(
                room_id,
                &RoomEvent::UserJoined {
                    user_id,
                    balance,
                    status: membership.status,
                    joined_at: membership.joined_at,
                },
            )
            .await;

        Ok(membership)
    }

    /// Resolve an active room by its code and join it
    ///
    /// # Errors
    ///
    /// `RoomCodeNotFound`
    pub async fn join_by_code(&self, user_id: UserId, code: &str) -> LedgerResult<(Room, Membership)> {
        let code = code.trim();
        if !is_valid_room_code(code) {
            return Err(LedgerError::RoomCodeNotFound(code.to_string()));
        }

        let room = {
            let mut tx = self.store.begin().await?;
            tx.active_room_by_code(code)
                .await?
                .ok_or_else(|| LedgerError::RoomCodeNotFound(code.to_string()))?
        };

        let membership = self.join(room.id, user_id).await?;
        Ok((room, membership))
    }

    /// Mark a member offline
    ///
    /// The membership stays open so the member can return. Afterwards the
    /// room is checked for inactivity.
    ///
    /// # Errors
    ///
    /// `NotAMember`, `RoomNotFound`, `RoomDissolved`
    pub async fn leave(&self, room_id: RoomId, user_id: UserId) -> LedgerResult<Membership> {
        let mut tx = self.store.begin().await?;
        require_active_room(tx.as_mut(), room_id, false).await?;
        let mut membership = require_member(tx.as_mut(), room_id, user_id).await?;

        let now = Utc::now();
        tx.set_member_status(membership.id, MemberStatus::Offline)
            .await?;
        tx.append_operation(
            &NewOperation::new(room_id, user_id, OperationKind::Leave, now).description("left the room"),
        )
        .await?;
        tx.commit().await?;
        membership.status = MemberStatus::Offline;

        log::info!("Room {}: user {} left", room_id, user_id);

        self.hub
            .publish(
                room_id,
                &RoomEvent::UserLeft {
                    user_id,
                    status: MemberStatus::Offline,
                    left_at: now,
                },
            )
            .await;

        self.check_inactivity_after(room_id).await;

        Ok(membership)
    }

    /// Mark another member offline on their behalf
    ///
    /// # Errors
    ///
    /// `SelfKick`, `NotAMember` for actor or target, `RoomNotFound`, `RoomDissolved`
    pub async fn kick(
        &self,
        room_id: RoomId,
        actor_id: UserId,
        target_id: UserId,
    ) -> LedgerResult<Membership> {
        if actor_id == target_id {
            return Err(LedgerError::SelfKick(actor_id));
        }

        let mut tx = self.store.begin().await?;
        require_active_room(tx.as_mut(), room_id, false).await?;
        require_member(tx.as_mut(), room_id, actor_id).await?;
        let mut membership = require_member(tx.as_mut(), room_id, target_id).await?;

        let now = Utc::now();
        tx.set_member_status(membership.id, MemberStatus::Offline)
            .await?;
        tx.append_operation(
            &NewOperation::new(room_id, actor_id, OperationKind::Kick, now)
                .target(target_id)
                .description(format!("kicked user {}", target_id)),
        )
        .await?;
        tx.commit().await?;
        membership.status = MemberStatus::Offline;

        log::info!(
            "Room {}: user {} kicked user {}",
            room_id,
            actor_id,
            target_id
        );

        self.hub
            .publish(
                room_id,
                &RoomEvent::UserKicked {
                    user_id: target_id,
                    kicked_by: actor_id,
                    status: MemberStatus::Offline,
                    kicked_at: now,
                },
            )
            .await;

        self.check_inactivity_after(room_id).await;

        Ok(membership)
    }

    /// Mark a member with an open membership online again
    ///
    /// # Errors
    ///
    /// `NotAMember`, `RoomNotFound`, `RoomDissolved`
    pub async fn return_to_room(&self, room_id: RoomId, user_id: UserId) -> LedgerResult<Membership> {
        let mut tx = self.store.begin().await?;
        require_active_room(tx.as_mut(), room_id, false).await?;
        let membership = require_member(tx.as_mut(), room_id, user_id).await?;
        self.mark_returned(tx, membership).await
    }

    async fn mark_returned(
        &self,
        mut tx: Box<dyn LedgerTx>,
        mut membership: Membership,
    ) -> LedgerResult<Membership> {
        let (room_id, user_id) = (membership.room_id, membership.user_id);

        let now = Utc::now();
        tx.set_member_status(membership.id, MemberStatus::Online)
            .await?;
        tx.append_operation(
            &NewOperation::new(room_id, user_id, OperationKind::Return, now)
                .description("returned to the room"),
        )
        .await?;
        let balance = tx.balance(room_id, user_id).await?.unwrap_or(0);
        tx.commit().await?;
        membership.status = MemberStatus::Online;

        log::info!("Room {}: user {} returned", room_id, user_id);

        self.hub
            .publish(
                room_id,
                &RoomEvent::UserReturned {
                    user_id,
                    balance,
                    status: MemberStatus::Online,
                    returned_at: now,
                },
            )
            .await;

        Ok(membership)
    }

    /// The room a user most recently joined and has not left, marked as returned
    ///
    /// Returns `None` when the user has no open membership.
    pub async fn last_room(&self, user_id: UserId) -> LedgerResult<Option<(Room, Membership)>> {
        let mut tx = self.store.begin().await?;
        let Some(membership) = tx.latest_open_membership_of(user_id).await? else {
            return Ok(None);
        };
        let room = require_active_room(tx.as_mut(), membership.room_id, false).await?;

        let membership = self.mark_returned(tx, membership).await?;
        Ok(Some((room, membership)))
    }

    /// Mark a member offline after their transport went away
    ///
    /// Writes no audit entry and broadcasts nothing.
    pub async fn disconnect(&self, room_id: RoomId, user_id: UserId) -> LedgerResult<()> {
        let mut tx = self.store.begin().await?;
        let Some(membership) = tx.open_membership(room_id, user_id).await? else {
            return Ok(());
        };
        if membership.status != MemberStatus::Online {
            return Ok(());
        }

        tx.set_member_status(membership.id, MemberStatus::Offline)
            .await?;
        tx.commit().await?;

        log::debug!("Room {}: user {} disconnected", room_id, user_id);
        Ok(())
    }

    /// Room snapshot for one of its members
    ///
    /// # Errors
    ///
    /// `NotAMember`, `RoomNotFound`
    pub async fn room_details(&self, room_id: RoomId, user_id: UserId) -> LedgerResult<RoomDetails> {
        let mut tx = self.store.begin().await?;
        let room = tx
            .room(room_id)
            .await?
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        require_member(tx.as_mut(), room_id, user_id).await?;

        let balances = tx.balances(room_id).await?;
        let balance_of = |user: UserId| {
            balances
                .iter()
                .find(|b| b.user_id == user)
                .map_or(0, |b| b.balance)
        };

        let members = tx
            .open_memberships(room_id)
            .await?
            .into_iter()
            .map(|m| MemberView {
                user_id: m.user_id,
                balance: balance_of(m.user_id),
                status: m.status,
                joined_at: m.joined_at,
            })
            .collect();
        let table_balance = table_balance_in(tx.as_mut(), room_id).await?;

        Ok(RoomDetails {
            my_balance: balance_of(user_id),
            room,
            members,
            table_balance,
        })
    }

    /// Audit history of a room, newest first
    ///
    /// Unless `include_all` is set only entries since the caller's latest join
    /// are returned. A `None` limit returns everything after `offset`.
    ///
    /// # Errors
    ///
    /// `NotAMember` if the caller never joined the room
    pub async fn operations(
        &self,
        room_id: RoomId,
        user_id: UserId,
        limit: Option<i64>,
        offset: i64,
        include_all: bool,
    ) -> LedgerResult<OperationPage> {
        let mut tx = self.store.begin().await?;
        let membership = tx
            .latest_membership(room_id, user_id)
            .await?
            .ok_or(LedgerError::NotAMember { room_id, user_id })?;

        let since = (!include_all).then_some(membership.joined_at);
        let operations = tx.operations(room_id, since, limit, offset).await?;
        let total = tx.count_operations(room_id, since).await?;

        Ok(OperationPage { operations, total })
    }

    async fn check_inactivity_after(&self, room_id: RoomId) {
        if let Err(e) = self.dissolve_if_inactive(room_id, Utc::now()).await {
            log::error!("Room {}: inactivity check failed: {}", room_id, e);
        }
    }
}
