//! Integration tests against a real PostgreSQL database.
//!
//! Skipped unless `DATABASE_URL` is set. Each test works in rooms it creates
//! itself, so leftovers from earlier runs do not interfere.

use chrono::{Duration, Utc};
use poker_score::{
    RoomId,
    db::{Database, DatabaseConfig},
    hub::{HubConfig, RoomHub},
    ledger::{LedgerError, NiuniuBetItem, RoomLedger},
    room::{GameVariant, LifecycleConfig, RoomManager, RoomStatus},
    settlement::SettlementEngine,
    store::{LedgerStore, LedgerTx, PgLedgerStore},
};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration as StdDuration;

struct PgHarness {
    store: Arc<dyn LedgerStore>,
    ledger: RoomLedger,
    settlement: SettlementEngine,
    rooms: Arc<RoomManager>,
}

/// Helper to connect and migrate, `None` without a configured database
async fn setup_pg() -> Option<PgHarness> {
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let config = DatabaseConfig {
        database_url,
        max_connections: 5,
        min_connections: 1,
        connection_timeout_secs: 5,
        idle_timeout_secs: 300,
        max_lifetime_secs: 1800,
    };
    let db = Database::new(&config)
        .await
        .expect("Failed to connect to test database");
    db.migrate().await.expect("Failed to run migrations");

    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(db.pool().clone()));
    let hub = RoomHub::spawn(&HubConfig::default());
    let settlement = SettlementEngine::new(store.clone(), hub.clone());

    Some(PgHarness {
        ledger: RoomLedger::new(store.clone(), hub.clone()),
        rooms: Arc::new(RoomManager::new(
            store.clone(),
            hub,
            settlement.clone(),
            LifecycleConfig::default(),
        )),
        settlement,
        store,
    })
}

#[tokio::test]
#[serial]
async fn test_pg_bet_withdraw_and_settle() {
    let Some(h) = setup_pg().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (room, _) = h
        .rooms
        .create_room(1, GameVariant::Texas, "20:1")
        .await
        .unwrap();
    h.rooms.join(room.id, 2).await.unwrap();
    h.rooms.join(room.id, 3).await.unwrap();

    h.ledger.bet(room.id, 2, 300).await.unwrap();
    h.ledger
        .niuniu_bet(
            room.id,
            3,
            &[NiuniuBetItem {
                to_user_id: 1,
                amount: 100,
            }],
        )
        .await
        .unwrap();
    assert_eq!(h.ledger.table_balance(room.id).await.unwrap(), 400);

    assert!(matches!(
        h.ledger.withdraw(room.id, 1, 401).await,
        Err(LedgerError::ExceedsPot { available: 400, .. })
    ));
    let outcome = h.ledger.withdraw(room.id, 1, 0).await.unwrap();
    assert_eq!(outcome.amount, 400);

    let proposal = h.settlement.propose(room.id, 1).await.unwrap();
    assert_eq!(proposal.plan.len(), 2);

    let receipt = h.settlement.confirm(room.id, 1).await.unwrap();
    let rows = h.settlement.settlements(room.id).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.batch == receipt.batch));
    assert_eq!(rows.iter().map(|r| r.chip_amount).sum::<i64>(), 0);

    let mut tx = h.store.begin().await.unwrap();
    assert!(tx.balances(room.id).await.unwrap().iter().all(|b| b.balance == 0));
    assert_eq!(tx.bet_records(room.id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_pg_inactive_room_is_auto_settled() {
    let Some(h) = setup_pg().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (room, _) = h
        .rooms
        .create_room(10, GameVariant::Niuniu, "10:1")
        .await
        .unwrap();
    h.rooms.join(room.id, 11).await.unwrap();
    h.ledger.bet(room.id, 11, 70).await.unwrap();

    let receipt = h
        .rooms
        .dissolve_if_inactive(room.id, Utc::now() + Duration::hours(13))
        .await
        .unwrap()
        .expect("room should dissolve");
    assert!(receipt.batch.starts_with("auto-"));

    let mut tx = h.store.begin().await.unwrap();
    let stored = tx.room(room.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RoomStatus::Dissolved);
    assert!(tx.open_memberships(room.id).await.unwrap().is_empty());

    let rows = tx.settlements(room.id).await.unwrap();
    let chips: Vec<(i64, i64)> = rows.iter().map(|r| (r.user_id, r.chip_amount)).collect();
    assert_eq!(chips, vec![(10, 70), (11, -70)]);
    assert!(rows.iter().all(|r| r.rmb_amount.abs() == 7.0));
}

#[tokio::test]
#[serial]
async fn test_pg_uncommitted_work_is_rolled_back() {
    let Some(h) = setup_pg().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (room, _) = h
        .rooms
        .create_room(20, GameVariant::Texas, "20:1")
        .await
        .unwrap();

    {
        let mut tx = h.store.begin().await.unwrap();
        tx.add_balance(room.id, 20, 500).await.unwrap();
    }

    assert_eq!(h.ledger.balance(room.id, 20).await.unwrap(), 0);
}

/// Sum of member balances plus the pot; zero whenever the ledger is consistent
async fn ledger_total(h: &PgHarness, room_id: RoomId) -> i64 {
    let mut tx = h.store.begin().await.unwrap();
    let balances: i64 = tx
        .balances(room_id)
        .await
        .unwrap()
        .iter()
        .map(|b| b.balance)
        .sum();
    drop(tx);
    balances + h.ledger.table_balance(room_id).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_pg_bet_waits_for_dissolution_and_is_rejected() {
    let Some(h) = setup_pg().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (room, _) = h
        .rooms
        .create_room(30, GameVariant::Texas, "20:1")
        .await
        .unwrap();
    h.rooms.join(room.id, 31).await.unwrap();

    // Hold a dissolution open while the bet arrives
    let mut tx = h.store.begin().await.unwrap();
    tx.lock_room(room.id).await.unwrap().unwrap();
    tx.zero_balances(room.id).await.unwrap();
    assert!(tx.mark_dissolved(room.id, Utc::now()).await.unwrap());
    tx.close_memberships(room.id, Utc::now()).await.unwrap();

    let ledger = h.ledger.clone();
    let bet = tokio::spawn(async move { ledger.bet(room.id, 31, 50).await });

    tokio::time::sleep(StdDuration::from_millis(200)).await;
    assert!(!bet.is_finished(), "bet must wait on the room lock");

    tx.commit().await.unwrap();

    let result = bet.await.unwrap();
    assert!(
        matches!(result, Err(LedgerError::RoomDissolved(id)) if id == room.id),
        "unexpected bet result: {:?}",
        result
    );
    assert_eq!(ledger_total(&h, room.id).await, 0);
    assert_eq!(h.ledger.table_balance(room.id).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_concurrent_bet_and_dissolve_stay_balanced() {
    let Some(h) = setup_pg().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    for _ in 0..10 {
        let (room, _) = h
            .rooms
            .create_room(40, GameVariant::Texas, "20:1")
            .await
            .unwrap();
        h.rooms.join(room.id, 41).await.unwrap();

        let ledger = h.ledger.clone();
        let rooms = h.rooms.clone();
        let (bet, dissolve) = tokio::join!(
            tokio::spawn(async move { ledger.bet(room.id, 41, 50).await }),
            tokio::spawn(async move { rooms.dissolve(room.id, 40).await }),
        );
        let (bet, dissolve) = (bet.unwrap(), dissolve.unwrap());

        match (&bet, &dissolve) {
            // Bet first: the pot blocks the dissolution
            (Ok(_), Err(LedgerError::PotNotZero { pot: 50 })) => {
                assert_eq!(h.ledger.table_balance(room.id).await.unwrap(), 50);
            }
            // Dissolution first: the bet sees a closed room
            (Err(LedgerError::RoomDissolved(_)), Ok(_)) => {
                assert_eq!(h.ledger.table_balance(room.id).await.unwrap(), 0);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(ledger_total(&h, room.id).await, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_concurrent_bet_and_confirm_stay_balanced() {
    let Some(h) = setup_pg().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    for _ in 0..10 {
        let (room, _) = h
            .rooms
            .create_room(50, GameVariant::Texas, "20:1")
            .await
            .unwrap();
        h.rooms.join(room.id, 51).await.unwrap();

        let ledger = h.ledger.clone();
        let settlement = h.settlement.clone();
        let (bet, confirm) = tokio::join!(
            tokio::spawn(async move { ledger.bet(room.id, 51, 50).await }),
            tokio::spawn(async move { settlement.confirm(room.id, 50).await }),
        );
        let (bet, confirm) = (bet.unwrap(), confirm.unwrap());

        assert!(bet.is_ok(), "bet failed: {:?}", bet);
        assert!(
            matches!(confirm, Ok(_) | Err(LedgerError::PotNotZero { pot: 50 })),
            "unexpected confirm result: {:?}",
            confirm
        );
        assert_eq!(h.ledger.table_balance(room.id).await.unwrap(), 50);
        assert_eq!(h.ledger.balance(room.id, 51).await.unwrap(), -50);
        assert_eq!(ledger_total(&h, room.id).await, 0);
    }
}
