//! Bank-style settlement plan.
//!
//! The largest winner acts as the bank: every loser pays the bank, the bank
//! pays every other winner. This yields `negatives + positives - 1` transfers.

use super::models::TransferEntry;
use super::rate::calculate_rmb_amount;
use crate::room::{MemberBalance, UserId};
use std::cmp::Reverse;

fn transfer(from: UserId, to: UserId, chips: i64, chip_rate: &str) -> TransferEntry {
    let rmb_amount = calculate_rmb_amount(chips, chip_rate);
    TransferEntry {
        from_user_id: from,
        to_user_id: to,
        chip_amount: chips,
        rmb_amount,
        description: format!(
            "user {} → user {}: {} chips (¥{:.2})",
            from, to, chips, rmb_amount
        ),
    }
}

/// Compute the transfer plan for the given balances
///
/// Positives are ordered by balance descending, negatives by balance
/// ascending, ties by ascending user id. Returns an empty plan when either
/// side is empty.
pub fn generate_plan(balances: &[MemberBalance], chip_rate: &str) -> Vec<TransferEntry> {
    let mut positives: Vec<MemberBalance> =
        balances.iter().copied().filter(|b| b.balance > 0).collect();
    let mut negatives: Vec<MemberBalance> =
        balances.iter().copied().filter(|b| b.balance < 0).collect();

    positives.sort_by_key(|b| (Reverse(b.balance), b.user_id));
    negatives.sort_by_key(|b| (b.balance, b.user_id));

    let Some(bank) = positives.first().copied() else {
        return Vec::new();
    };
    if negatives.is_empty() {
        return Vec::new();
    }

    let mut plan = Vec::with_capacity(negatives.len() + positives.len() - 1);
    for debtor in &negatives {
        plan.push(transfer(
            debtor.user_id,
            bank.user_id,
            debtor.balance.saturating_neg(),
            chip_rate,
        ));
    }
    for creditor in positives.iter().skip(1) {
        plan.push(transfer(
            bank.user_id,
            creditor.user_id,
            creditor.balance,
            chip_rate,
        ));
    }

    plan
}
