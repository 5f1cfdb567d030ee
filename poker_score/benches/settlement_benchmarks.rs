use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use poker_score::{
    room::MemberBalance,
    settlement::{calculate_rmb_amount, generate_plan},
};
use std::hint::black_box;

/// Zero-sum balances for `n` members, alternating winners and losers
fn balances(n: i64) -> Vec<MemberBalance> {
    let mut balances: Vec<MemberBalance> = (1..n)
        .map(|user_id| MemberBalance {
            user_id,
            balance: if user_id % 2 == 0 { user_id * 37 } else { -user_id * 23 },
        })
        .collect();
    let rest: i64 = balances.iter().map(|b| b.balance).sum();
    balances.push(MemberBalance {
        user_id: n,
        balance: -rest,
    });
    balances
}

/// Benchmark plan generation for growing rooms
fn bench_generate_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_plan");

    for members in [4, 10, 50, 200] {
        let input = balances(members);
        group.bench_with_input(BenchmarkId::from_parameter(members), &input, |b, input| {
            b.iter(|| generate_plan(black_box(input), black_box("20:1")));
        });
    }

    group.finish();
}

/// Benchmark rate parsing and conversion
fn bench_rate_conversion(c: &mut Criterion) {
    c.bench_function("calculate_rmb_amount", |b| {
        b.iter(|| calculate_rmb_amount(black_box(12_345), black_box("20:1")));
    });

    c.bench_function("calculate_rmb_amount_malformed", |b| {
        b.iter(|| calculate_rmb_amount(black_box(12_345), black_box("twenty")));
    });
}

criterion_group!(benches, bench_generate_plan, bench_rate_conversion);
criterion_main!(benches);
