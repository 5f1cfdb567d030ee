//! Shared setup for the in-memory integration tests.

#![allow(dead_code)]

use poker_score::{
    hub::{HubConfig, HubHandle, Payload, RoomEvent, RoomHub},
    ledger::RoomLedger,
    room::{GameVariant, LifecycleConfig, RoomId, RoomManager, UserId},
    settlement::SettlementEngine,
    store::{LedgerStore, LedgerTx, MemoryLedgerStore},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct Harness {
    pub store: Arc<dyn LedgerStore>,
    pub hub: HubHandle,
    pub ledger: RoomLedger,
    pub settlement: SettlementEngine,
    pub rooms: Arc<RoomManager>,
}

/// Wire every component to a fresh in-memory store; needs a runtime
pub fn setup() -> Harness {
    setup_with(LifecycleConfig::default())
}

pub fn setup_with(config: LifecycleConfig) -> Harness {
    let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
    let hub = RoomHub::spawn(&HubConfig::default());
    let ledger = RoomLedger::new(store.clone(), hub.clone());
    let settlement = SettlementEngine::new(store.clone(), hub.clone());
    let rooms = Arc::new(RoomManager::new(
        store.clone(),
        hub.clone(),
        settlement.clone(),
        config,
    ));

    Harness {
        store,
        hub,
        ledger,
        settlement,
        rooms,
    }
}

/// Room created by the first user and joined by the rest
pub async fn room_with(h: &Harness, members: &[UserId]) -> RoomId {
    let (room, _) = h
        .rooms
        .create_room(members[0], GameVariant::Texas, "20:1")
        .await
        .unwrap();
    for &user in &members[1..] {
        h.rooms.join(room.id, user).await.unwrap();
    }
    room.id
}

pub async fn balance_sum(h: &Harness, room_id: RoomId) -> i64 {
    let mut tx = h.store.begin().await.unwrap();
    tx.balances(room_id)
        .await
        .unwrap()
        .iter()
        .map(|b| b.balance)
        .sum()
}

pub async fn assert_conserved(h: &Harness, room_id: RoomId) {
    let sum = balance_sum(h, room_id).await;
    let pot = h.ledger.table_balance(room_id).await.unwrap();
    assert_eq!(sum + pot, 0, "balances {} + pot {} must be zero", sum, pot);
}

pub async fn next_event(rx: &mut mpsc::Receiver<Payload>) -> RoomEvent {
    let payload = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event in time")
        .expect("connection open");
    RoomEvent::from_payload(&payload).unwrap()
}
