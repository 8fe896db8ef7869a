//! Property tests for the universal invariants of the opportunity engine, matching
//! the teacher's convention of colocating one integration-test file per cross-cutting
//! property (see `tests/backtest_run_integration.rs` upstream).

use std::sync::Arc;

use proptest::prelude::*;
use spot_arb_engine::engine::{evaluate_opportunity, EngineThresholds};
use spot_arb_engine::order::{OrderEntity, OrderRole};
use spot_arb_engine::types::{OrderBookLevel, OrderBookSnapshot, Symbol};

fn thresholds() -> EngineThresholds {
    EngineThresholds {
        min_base_qty: 0.0,
        min_quote_qty: 0.0,
        base_precision: 6,
        quote_precision: 6,
        min_profit_perc: 0.0,
        min_profit_amount: 0.0,
    }
}

/// Builds a monotone descending-price book of `n` levels starting at `top`, each
/// `step` apart, with `qty` resting at every level.
fn monotone_levels(top: f64, step: f64, qty: f64, n: usize) -> Vec<(f64, f64)> {
    (0..n).map(|i| (top - step * i as f64, qty)).collect()
}

fn build_pair(bid_levels: &[(f64, f64)], ask_levels: &[(f64, f64)]) -> (OrderEntity, OrderEntity) {
    let sym = Symbol::new("ETH", "USDT");
    let bid_snap = Arc::new(OrderBookSnapshot::new(
        "left",
        sym.clone(),
        vec![],
        bid_levels.iter().map(|&(p, q)| OrderBookLevel::new(p, q)).collect(),
    ));
    let ask_snap = Arc::new(OrderBookSnapshot::new(
        "right",
        sym,
        ask_levels.iter().map(|&(p, q)| OrderBookLevel::new(p, q)).collect(),
        vec![],
    ));
    (
        OrderEntity::new(OrderRole::Ask, ask_snap, 0.001, 8, 8),
        OrderEntity::new(OrderRole::Bid, bid_snap, 0.001, 8, 8),
    )
}

proptest! {
    /// (a) For random monotone books and random balances, the mutual recalibration
    /// post-condition holds: both legs settle within one base-precision unit.
    #[test]
    fn recalibration_equalises_base_quantities(
        bid_top in 1000.0f64..1100.0,
        ask_top in 900.0f64..1000.0,
        step in 0.1f64..2.0,
        qty in 1.0f64..50.0,
        n in 1usize..12,
        quote_balance in 1.0f64..1_000_000.0,
        base_balance in 1.0f64..1_000.0,
    ) {
        let bid_levels = monotone_levels(bid_top, step, qty, n);
        let ask_levels = monotone_levels(ask_top, step, qty, n)
            .into_iter()
            .rev()
            .collect::<Vec<_>>();
        let (mut ask, mut bid) = build_pair(&bid_levels, &ask_levels);

        if let Ok(_decision) = evaluate_opportunity(&mut ask, &mut bid, quote_balance, base_balance, &thresholds()) {
            let tolerance = 10f64.powi(-(thresholds().base_precision as i32));
            prop_assert!((ask.base_qty - bid.base_qty).abs() <= tolerance + 1e-9);
        }
    }

    /// (b) Accepting a trade implies positive expected profit.
    #[test]
    fn accepted_decision_has_positive_profit(
        spread in 0.5f64..50.0,
        qty in 1.0f64..20.0,
    ) {
        let ask_levels = vec![(1000.0, qty)];
        let bid_levels = vec![(1000.0 + spread, qty)];
        let (mut ask, mut bid) = build_pair(&bid_levels, &ask_levels);

        if let Ok(decision) = evaluate_opportunity(&mut ask, &mut bid, 1_000_000.0, 1_000_000.0, &thresholds()) {
            prop_assert!(decision.profit_quote > 0.0);
        }
    }
}

/// Idempotence: evaluating the same inputs twice yields identical decisions.
#[test]
fn evaluating_twice_is_idempotent() {
    let bid_levels = vec![(1015.0, 10.0), (1014.0, 20.0)];
    let ask_levels = vec![(1006.0, 10.0), (1007.0, 20.0)];

    let (mut ask_a, mut bid_a) = build_pair(&bid_levels, &ask_levels);
    let first = evaluate_opportunity(&mut ask_a, &mut bid_a, 1_000_000.0, 1_000_000.0, &thresholds());

    let (mut ask_b, mut bid_b) = build_pair(&bid_levels, &ask_levels);
    let second = evaluate_opportunity(&mut ask_b, &mut bid_b, 1_000_000.0, 1_000_000.0, &thresholds());

    assert_eq!(first, second);
}
