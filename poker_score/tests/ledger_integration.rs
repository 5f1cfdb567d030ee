//! Ledger engine integration tests against the in-memory store.

mod common;

use common::{assert_conserved, next_event, room_with, setup};
use poker_score::{
    hub::RoomEvent,
    ledger::{LedgerError, NiuniuBetItem, OperationKind},
    room::UserId,
    store::{LedgerStore, LedgerTx},
};
use tokio::sync::mpsc;

#[tokio::test]
async fn test_bet_debits_member_and_fills_pot() {
    let h = setup();
    let room = room_with(&h, &[1, 2]).await;

    let outcome = h.ledger.bet(room, 1, 150).await.unwrap();
    assert_eq!(outcome.balance, -150);
    assert_eq!(outcome.table_balance, 150);

    let outcome = h.ledger.bet(room, 2, 50).await.unwrap();
    assert_eq!(outcome.balance, -50);
    assert_eq!(outcome.table_balance, 200);

    assert_conserved(&h, room).await;
}

#[tokio::test]
async fn test_bet_is_broadcast_to_room() {
    let h = setup();
    let room = room_with(&h, &[1, 2]).await;
    let (tx, mut rx) = mpsc::channel(16);
    h.hub.attach(room, 2, tx).await.unwrap();

    h.ledger.bet(room, 1, 40).await.unwrap();

    match next_event(&mut rx).await {
        RoomEvent::Bet {
            user_id,
            amount,
            balance,
            table_balance,
            ..
        } => {
            assert_eq!((user_id, amount, balance, table_balance), (1, 40, -40, 40));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_bet_rejects_non_positive_amounts() {
    let h = setup();
    let room = room_with(&h, &[1]).await;

    assert!(matches!(
        h.ledger.bet(room, 1, 0).await,
        Err(LedgerError::InvalidAmount(0))
    ));
    assert!(matches!(
        h.ledger.bet(room, 1, -5).await,
        Err(LedgerError::InvalidAmount(-5))
    ));
    assert_eq!(h.ledger.balance(room, 1).await.unwrap(), 0);
    assert_eq!(h.ledger.table_balance(room).await.unwrap(), 0);
}

#[tokio::test]
async fn test_bet_requires_membership_and_known_room() {
    let h = setup();
    let room = room_with(&h, &[1]).await;

    assert!(matches!(
        h.ledger.bet(room, 99, 10).await,
        Err(LedgerError::NotAMember { user_id: 99, .. })
    ));
    assert!(matches!(
        h.ledger.bet(room + 1000, 1, 10).await,
        Err(LedgerError::RoomNotFound(_))
    ));
}

#[tokio::test]
async fn test_withdraw_all_takes_exactly_the_pot() {
    let h = setup();
    let room = room_with(&h, &[1, 2]).await;
    h.ledger.bet(room, 1, 120).await.unwrap();
    h.ledger.bet(room, 2, 80).await.unwrap();

    let outcome = h.ledger.withdraw(room, 2, 0).await.unwrap();
    assert_eq!(outcome.amount, 200);
    assert_eq!(outcome.balance, 120);
    assert_eq!(outcome.table_balance, 0);

    assert_conserved(&h, room).await;
}

#[tokio::test]
async fn test_withdraw_partial_amount() {
    let h = setup();
    let room = room_with(&h, &[1, 2]).await;
    h.ledger.bet(room, 1, 100).await.unwrap();

    let outcome = h.ledger.withdraw(room, 2, 30).await.unwrap();
    assert_eq!(outcome.amount, 30);
    assert_eq!(outcome.balance, 30);
    assert_eq!(outcome.table_balance, 70);
}

#[tokio::test]
async fn test_withdraw_more_than_pot_changes_nothing() {
    let h = setup();
    let room = room_with(&h, &[1, 2]).await;
    h.ledger.bet(room, 1, 100).await.unwrap();

    let err = h.ledger.withdraw(room, 2, 101).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::ExceedsPot {
            requested: 101,
            available: 100
        }
    ));
    assert_eq!(h.ledger.balance(room, 2).await.unwrap(), 0);
    assert_eq!(h.ledger.table_balance(room).await.unwrap(), 100);
}

#[tokio::test]
async fn test_withdraw_from_empty_pot() {
    let h = setup();
    let room = room_with(&h, &[1]).await;

    assert!(matches!(
        h.ledger.withdraw(room, 1, 0).await,
        Err(LedgerError::PotEmpty)
    ));
    assert!(matches!(
        h.ledger.withdraw(room, 1, 10).await,
        Err(LedgerError::PotEmpty)
    ));
}

#[tokio::test]
async fn test_force_transfer_drains_pot_to_target() {
    let h = setup();
    let room = room_with(&h, &[1, 2, 3]).await;
    h.ledger.bet(room, 1, 100).await.unwrap();
    h.ledger.bet(room, 2, 200).await.unwrap();

    let outcome = h.ledger.force_transfer(room, 3, 2).await.unwrap();
    assert_eq!(outcome.amount, 300);
    assert_eq!(outcome.target_balance, 100);
    assert_eq!(outcome.actor_balance, 0);
    assert_eq!(outcome.table_balance, 0);

    // Pot is drained for good, not just until the next read
    assert_eq!(h.ledger.table_balance(room).await.unwrap(), 0);
    assert_conserved(&h, room).await;
}

#[tokio::test]
async fn test_force_transfer_failures() {
    let h = setup();
    let room = room_with(&h, &[1, 2]).await;

    assert!(matches!(
        h.ledger.force_transfer(room, 1, 2).await,
        Err(LedgerError::PotEmpty)
    ));

    h.ledger.bet(room, 1, 10).await.unwrap();
    assert!(matches!(
        h.ledger.force_transfer(room, 1, 77).await,
        Err(LedgerError::NotAMember { user_id: 77, .. })
    ));
    assert!(matches!(
        h.ledger.force_transfer(room, 77, 1).await,
        Err(LedgerError::NotAMember { user_id: 77, .. })
    ));
    assert_eq!(h.ledger.table_balance(room).await.unwrap(), 10);
}

#[tokio::test]
async fn test_niuniu_bet_debits_total_only() {
    let h = setup();
    let room = room_with(&h, &[1, 2, 3]).await;

    let bets = [
        NiuniuBetItem {
            to_user_id: 2,
            amount: 30,
        },
        NiuniuBetItem {
            to_user_id: 3,
            amount: 45,
        },
    ];
    let outcome = h.ledger.niuniu_bet(room, 1, &bets).await.unwrap();
    assert_eq!(outcome.total_amount, 75);
    assert_eq!(outcome.balance, -75);
    assert_eq!(outcome.table_balance, 75);

    // Targets are not credited
    assert_eq!(h.ledger.balance(room, 2).await.unwrap(), 0);
    assert_eq!(h.ledger.balance(room, 3).await.unwrap(), 0);

    let mut tx = h.store.begin().await.unwrap();
    let records = tx.bet_records(room).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.from_user_id == 1));

    let ops = tx.operations(room, None, Some(1), 0).await.unwrap();
    assert_eq!(ops[0].kind, OperationKind::NiuniuBet);
    let breakdown: Vec<NiuniuBetItem> = serde_json::from_str(&ops[0].description).unwrap();
    assert_eq!(breakdown, bets);
    drop(tx);

    assert_conserved(&h, room).await;
}

#[tokio::test]
async fn test_invalid_niuniu_bet_is_not_applied() {
    let h = setup();
    let room = room_with(&h, &[1, 2]).await;

    let bets = [
        NiuniuBetItem {
            to_user_id: 2,
            amount: 30,
        },
        NiuniuBetItem {
            to_user_id: 2,
            amount: 0,
        },
    ];
    assert!(matches!(
        h.ledger.niuniu_bet(room, 1, &bets).await,
        Err(LedgerError::InvalidBet(_))
    ));
    assert!(matches!(
        h.ledger.niuniu_bet(room, 1, &[]).await,
        Err(LedgerError::InvalidBet(_))
    ));

    let mut tx = h.store.begin().await.unwrap();
    assert!(tx.bet_records(room).await.unwrap().is_empty());
    assert_eq!(tx.balance(room, 1).await.unwrap(), Some(0));
}

#[tokio::test]
async fn test_operations_on_dissolved_room_fail() {
    let h = setup();
    let room = room_with(&h, &[1, 2]).await;
    h.rooms.dissolve(room, 1).await.unwrap();

    assert!(matches!(
        h.ledger.bet(room, 1, 10).await,
        Err(LedgerError::RoomDissolved(_))
    ));
    assert!(matches!(
        h.ledger.withdraw(room, 1, 0).await,
        Err(LedgerError::RoomDissolved(_))
    ));
}

#[tokio::test]
async fn test_history_amounts_keep_six_newest() {
    let h = setup();
    let room = room_with(&h, &[1, 2]).await;

    for amount in 1..=8 {
        h.ledger.bet(room, 1, amount * 10).await.unwrap();
    }
    h.ledger.withdraw(room, 1, 25).await.unwrap();
    h.ledger.withdraw(room, 2, 15).await.unwrap();

    let history = h.ledger.history_amounts(room, 1).await.unwrap();
    assert_eq!(history.bets, vec![80, 70, 60, 50, 40, 30]);
    assert_eq!(history.withdrawals, vec![25]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bets_never_lose_updates() {
    let h = setup();
    let members: Vec<UserId> = (1..=8).collect();
    let room = room_with(&h, &members).await;

    let mut tasks = Vec::new();
    for &user in &members {
        for _ in 0..10 {
            let ledger = h.ledger.clone();
            tasks.push(tokio::spawn(async move { ledger.bet(room, user, 5).await }));
        }
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    for &user in &members {
        assert_eq!(h.ledger.balance(room, user).await.unwrap(), -50);
    }
    assert_eq!(h.ledger.table_balance(room).await.unwrap(), 400);
    assert_conserved(&h, room).await;
}
