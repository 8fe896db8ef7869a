//! Opportunity Engine: the pure accept/reject/size decision over one ASK/BID pair.
//! Mission: every input that can change a decision is a parameter, so the same call
//! always produces the same answer and is trivial to test without a network.
//!
//! Grounded on `arbitrage/engine.rs`'s evaluate-then-reason-code shape, and on
//! `original_source/trader/trade.py`'s `get_best_opportunity` for the mutual
//! recalibration step and the OR-logic profit-threshold check.

use tracing::error;

use crate::order::{OrderEntity, OrderRole, QtyCap};
use crate::types::MarketMeta;

/// Stable reason code attached to every rejection, logged verbatim (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRejection {
    SameVenue,
    InsufficientQuote,
    InsufficientBase,
    NoArbitrage,
    BelowMinBase,
    BelowMinQuote,
    BelowMinProfit,
}

impl EngineRejection {
    pub fn code(self) -> &'static str {
        match self {
            EngineRejection::SameVenue => "SAME_VENUE",
            EngineRejection::InsufficientQuote => "INSUFFICIENT_QUOTE",
            EngineRejection::InsufficientBase => "INSUFFICIENT_BASE",
            EngineRejection::NoArbitrage => "NO_ARBITRAGE",
            EngineRejection::BelowMinBase => "BELOW_MIN_BASE",
            EngineRejection::BelowMinQuote => "BELOW_MIN_QUOTE",
            EngineRejection::BelowMinProfit => "BELOW_MIN_PROFIT",
        }
    }
}

/// A sized, accepted opportunity ready for the Trade Controller to place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineDecision {
    pub order_base: f64,
    pub order_quote: f64,
    pub profit_perc: f64,
    pub profit_quote: f64,
}

/// Thresholds and precision the two venues agree to operate under for this pair.
pub struct EngineThresholds {
    pub min_base_qty: f64,
    pub min_quote_qty: f64,
    pub base_precision: u32,
    pub quote_precision: u32,
    pub min_profit_perc: f64,
    pub min_profit_amount: f64,
}

/// Runs the 12-step evaluation. Mutates `ask`/`bid` in place (the walk results are
/// part of the decision's evidence trail), returning the sized decision or the first
/// rejection reason encountered.
pub fn evaluate_opportunity(
    ask: &mut OrderEntity,
    bid: &mut OrderEntity,
    ask_venue_quote_balance: f64,
    bid_venue_base_balance: f64,
    thresholds: &EngineThresholds,
) -> Result<EngineDecision, EngineRejection> {
    debug_assert_eq!(ask.role, OrderRole::Ask);
    debug_assert_eq!(bid.role, OrderRole::Bid);

    if ask.venue == bid.venue {
        return Err(EngineRejection::SameVenue);
    }

    if ask_venue_quote_balance < thresholds.min_quote_qty {
        return Err(EngineRejection::InsufficientQuote);
    }
    if bid_venue_base_balance < thresholds.min_base_qty {
        return Err(EngineRejection::InsufficientBase);
    }

    let bid_first_fee = bid.first_price_with_fee();
    let ask_first_fee = ask.first_price_with_fee();

    match bid_first_fee {
        Some(p_opp) => ask.calculate_opportunity(p_opp, Some(QtyCap::MaxQuote(ask_venue_quote_balance))),
        None => ask.calculate_opportunity(f64::NEG_INFINITY, Some(QtyCap::MaxQuote(ask_venue_quote_balance))),
    }
    match ask_first_fee {
        Some(p_opp) => bid.calculate_opportunity(p_opp, Some(QtyCap::MaxBase(bid_venue_base_balance))),
        None => bid.calculate_opportunity(f64::INFINITY, Some(QtyCap::MaxBase(bid_venue_base_balance))),
    }

    recalibrate(ask, bid);
    check_recalibration_invariant(ask, bid, thresholds.base_precision);

    if !ask.found || !bid.found {
        return Err(EngineRejection::NoArbitrage);
    }

    let order_base = crate::types::round_down(bid.base_qty, thresholds.base_precision);
    if order_base < thresholds.min_base_qty {
        return Err(EngineRejection::BelowMinBase);
    }

    let order_quote = crate::types::round_down(ask.quote_qty, thresholds.quote_precision);
    if order_quote < thresholds.min_quote_qty {
        return Err(EngineRejection::BelowMinQuote);
    }

    let profit_quote = bid.quote_qty - ask.quote_qty;
    let profit_perc = if bid.quote_qty != 0.0 {
        100.0 * profit_quote / bid.quote_qty
    } else {
        0.0
    };

    if profit_perc < thresholds.min_profit_perc && profit_quote < thresholds.min_profit_amount {
        return Err(EngineRejection::BelowMinProfit);
    }

    Ok(EngineDecision {
        order_base,
        order_quote,
        profit_perc,
        profit_quote,
    })
}

/// Re-runs whichever side walked further with the smaller side's `base_qty` as a
/// cap, so both legs settle on the same fillable base quantity.
fn recalibrate(ask: &mut OrderEntity, bid: &mut OrderEntity) {
    if ask.base_qty > bid.base_qty {
        let p_opp = bid.first_price_with_fee().unwrap_or(f64::NEG_INFINITY);
        ask.calculate_opportunity(p_opp, Some(QtyCap::MaxBase(bid.base_qty)));
    } else if bid.base_qty > ask.base_qty {
        let p_opp = ask.first_price_with_fee().unwrap_or(f64::INFINITY);
        bid.calculate_opportunity(p_opp, Some(QtyCap::MaxBase(ask.base_qty)));
    }
}

/// Enforces the §3/§7 post-recalibration invariant: both legs must settle on the
/// same base quantity to within one base-precision unit. A violation here means the
/// walk or the recalibration logic itself is broken, not a recoverable input
/// problem — per §7 item 6 the process exits rather than risk silent drift.
fn check_recalibration_invariant(ask: &OrderEntity, bid: &OrderEntity, base_precision: u32) {
    let tolerance = 10f64.powi(-(base_precision as i32));
    if (ask.base_qty - bid.base_qty).abs() > tolerance {
        error!(
            ask_base_qty = ask.base_qty,
            bid_base_qty = bid.base_qty,
            tolerance,
            "post-recalibration base quantity mismatch exceeds tolerance, terminating"
        );
        std::process::exit(1);
    }
}

pub fn default_thresholds(meta: &MarketMeta, min_profit_perc: f64, min_profit_amount: f64) -> EngineThresholds {
    EngineThresholds {
        min_base_qty: meta.min_base_qty,
        min_quote_qty: meta.min_quote_qty,
        base_precision: meta.base_precision,
        quote_precision: meta.quote_precision,
        min_profit_perc,
        min_profit_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderBookLevel, OrderBookSnapshot, Symbol};
    use std::sync::Arc;

    fn thresholds() -> EngineThresholds {
        EngineThresholds {
            min_base_qty: 0.0,
            min_quote_qty: 0.0,
            base_precision: 8,
            quote_precision: 8,
            min_profit_perc: 0.0,
            min_profit_amount: 0.0,
        }
    }

    fn pair(
        bid_levels: Vec<(f64, f64)>,
        ask_levels: Vec<(f64, f64)>,
    ) -> (OrderEntity, OrderEntity) {
        let sym = Symbol::new("ETH", "USDT");
        let bid_snap = Arc::new(OrderBookSnapshot::new(
            "left",
            sym.clone(),
            vec![],
            bid_levels.into_iter().map(|(p, q)| OrderBookLevel::new(p, q)).collect(),
        ));
        let ask_snap = Arc::new(OrderBookSnapshot::new(
            "right",
            sym,
            ask_levels.into_iter().map(|(p, q)| OrderBookLevel::new(p, q)).collect(),
            vec![],
        ));
        let bid = OrderEntity::new(OrderRole::Bid, bid_snap, 0.002, 8, 8);
        let ask = OrderEntity::new(OrderRole::Ask, ask_snap, 0.002, 8, 8);
        (ask, bid)
    }

    const LEFT_BIDS: [(f64, f64); 9] = [
        (1015.0, 10.0),
        (1014.0, 20.0),
        (1013.0, 50.0),
        (1012.0, 10.0),
        (1011.0, 20.0),
        (1010.0, 50.0),
        (1009.0, 10.0),
        (1008.0, 20.0),
        (1007.0, 50.0),
    ];
    const RIGHT_ASKS: [(f64, f64); 9] = [
        (1006.0, 10.0),
        (1007.0, 20.0),
        (1008.0, 50.0),
        (1009.0, 10.0),
        (1010.0, 20.0),
        (1011.0, 50.0),
        (1012.0, 10.0),
        (1013.0, 20.0),
        (1014.0, 50.0),
    ];

    #[test]
    fn s1_base_balance_dominates() {
        let (mut ask, mut bid) = pair(LEFT_BIDS.to_vec(), RIGHT_ASKS.to_vec());
        let decision = evaluate_opportunity(&mut ask, &mut bid, 1_000_000.0, 70.0, &thresholds()).unwrap();
        assert!((decision.order_base - 70.0).abs() < 1e-6);
        assert!((decision.order_quote - 70661.04).abs() < 1.0);
    }

    #[test]
    fn s3_bid_book_dominates() {
        let (mut ask, mut bid) = pair(vec![(1015.0, 10.0), (1014.0, 20.0)], RIGHT_ASKS.to_vec());
        let decision = evaluate_opportunity(&mut ask, &mut bid, 1_000_000.0, 1_000_000.0, &thresholds()).unwrap();
        assert!((decision.order_base - 30.0).abs() < 1e-6);
    }

    #[test]
    fn s4_ask_book_dominates() {
        let (mut ask, mut bid) = pair(LEFT_BIDS.to_vec(), vec![(1006.0, 10.0), (1007.0, 40.0)]);
        let decision = evaluate_opportunity(&mut ask, &mut bid, 1_000_000.0, 1_000_000.0, &thresholds()).unwrap();
        assert!((decision.order_base - 50.0).abs() < 1e-6);
    }

    #[test]
    fn s5_no_arbitrage() {
        let (mut ask, mut bid) = pair(vec![(1015.0, 10.0)], vec![(1020.0, 10.0)]);
        let err = evaluate_opportunity(&mut ask, &mut bid, 1_000_000.0, 1_000_000.0, &thresholds()).unwrap_err();
        assert_eq!(err, EngineRejection::NoArbitrage);
    }

    #[test]
    fn s6_below_min_profit_requires_both_thresholds_to_fail() {
        // ask 1000 -> fee-adjusted 1002.0; bid 1004.3 -> fee-adjusted ~1002.29,
        // a small real arbitrage (~0.029% / ~2.9 quote across the 10-unit level) that
        // should still be rejected once both thresholds sit above what it clears.
        let (mut ask, mut bid) = pair(vec![(1004.3, 10.0)], vec![(1000.0, 10.0)]);
        let mut t = thresholds();
        t.min_profit_perc = 0.05;
        t.min_profit_amount = 5.0;
        let err = evaluate_opportunity(&mut ask, &mut bid, 1_000_000.0, 1_000_000.0, &t).unwrap_err();
        assert_eq!(err, EngineRejection::BelowMinProfit);
    }

    #[test]
    fn same_venue_rejected_before_any_walk() {
        let sym = Symbol::new("ETH", "USDT");
        let snap = Arc::new(OrderBookSnapshot::new(
            "same",
            sym,
            vec![OrderBookLevel::new(100.0, 1.0)],
            vec![OrderBookLevel::new(99.0, 1.0)],
        ));
        let mut ask = OrderEntity::new(OrderRole::Ask, snap.clone(), 0.0, 8, 8);
        let mut bid = OrderEntity::new(OrderRole::Bid, snap, 0.0, 8, 8);
        let err = evaluate_opportunity(&mut ask, &mut bid, 1.0, 1.0, &thresholds()).unwrap_err();
        assert_eq!(err, EngineRejection::SameVenue);
    }
}
