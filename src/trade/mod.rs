//! Trade Controller: carries one candidate opportunity from evaluation through
//! placement, verification and (if needed) cancellation.
//! Mission: every trade reaches exactly one terminal state, and a leg is never left
//! resting on a venue after the controller returns.
//!
//! Grounded on `original_source/trader/trade.py`'s `CryptonTrade` state progression —
//! the 20-iteration increasing-sleep poll loop and the accept/cancel fan-out are
//! taken directly from there — re-expressed as an explicit Rust enum instead of the
//! original's string-status attribute.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{evaluate_opportunity, EngineDecision, EngineRejection, EngineThresholds};
use crate::order::{OrderEntity, OrderStatus};
use crate::venue::VenueAdapter;

const MAX_VERIFY_POLLS: u32 = 20;
const VERIFY_BASE_SLEEP_SECS: f64 = 1.0;
const VERIFY_SLEEP_STEP_SECS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeState {
    Evaluating,
    Placing,
    Verifying,
    Cancelling,
    Success,
    Partial,
    Aborted,
    Rejected,
}

/// Final profit figures once both legs have reported a fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActualProfit {
    pub profit_quote: f64,
    pub profit_perc: f64,
}

/// One attempted arbitrage, from evaluation to its terminal state.
pub struct Trade {
    pub trade_id: String,
    pub created_at_ms: i64,
    pub market_pair_id: String,
    pub ask: OrderEntity,
    pub bid: OrderEntity,
    pub ask_balance: f64,
    pub bid_balance: f64,
    pub state: TradeState,
    pub rejection: Option<EngineRejection>,
    pub expected: Option<EngineDecision>,
    pub actual: Option<ActualProfit>,
}

impl Trade {
    /// Debit instructions for the Balance Cache, populated only after a confirmed
    /// SUCCESS fill: the quote spent on the ASK venue and the base spent on the BID
    /// venue. PARTIAL fills are recorded but not locally debited.
    pub fn fill_debits(&self) -> Option<(f64, f64)> {
        match self.state {
            TradeState::Success => Some((self.ask.actual_quote_qty, self.bid.actual_base_qty)),
            _ => None,
        }
    }
}

/// Runs one trade to completion against the two venue adapters. `created_at_ms` is
/// supplied by the caller since this crate never calls wall-clock time internally.
pub async fn run_trade(
    market_pair_id: String,
    ask: OrderEntity,
    bid: OrderEntity,
    ask_balance: f64,
    bid_balance: f64,
    thresholds: &EngineThresholds,
    ask_adapter: Arc<dyn VenueAdapter>,
    bid_adapter: Arc<dyn VenueAdapter>,
    created_at_ms: i64,
) -> Trade {
    let trade_id = Uuid::new_v4().to_string();
    let mut trade = Trade {
        trade_id: trade_id.clone(),
        created_at_ms,
        market_pair_id,
        ask,
        bid,
        ask_balance,
        bid_balance,
        state: TradeState::Evaluating,
        rejection: None,
        expected: None,
        actual: None,
    };

    let decision = match evaluate_opportunity(&mut trade.ask, &mut trade.bid, ask_balance, bid_balance, thresholds) {
        Ok(decision) => decision,
        Err(reason) => {
            info!(reason = reason.code(), trade_id = %trade_id, "trade rejected at evaluation");
            trade.state = TradeState::Rejected;
            trade.rejection = Some(reason);
            return trade;
        }
    };
    trade.expected = Some(decision);
    trade.state = TradeState::Placing;

    let ask_price = trade.ask.price;
    let bid_price = trade.bid.price;
    let (ask_accepted, bid_accepted) = tokio::join!(
        trade.ask.buy(ask_adapter.as_ref(), &trade_id, decision.order_base, ask_price),
        trade.bid.sell(bid_adapter.as_ref(), &trade_id, decision.order_base, bid_price),
    );
    let ask_accepted = ask_accepted.unwrap_or(false);
    let bid_accepted = bid_accepted.unwrap_or(false);

    if ask_accepted && bid_accepted {
        trade.state = TradeState::Verifying;
        verify(&mut trade, ask_adapter.as_ref(), bid_adapter.as_ref()).await;
    } else if ask_accepted || bid_accepted {
        trade.state = TradeState::Cancelling;
        if ask_accepted {
            let _ = trade.ask.cancel(ask_adapter.as_ref()).await;
        } else {
            let _ = trade.bid.cancel(bid_adapter.as_ref()).await;
        }
        warn!(trade_id = %trade_id, "placement split, cancelling accepted leg");
        trade.state = TradeState::Aborted;
    } else {
        trade.state = TradeState::Aborted;
    }

    trade
}

async fn verify(trade: &mut Trade, ask_adapter: &dyn VenueAdapter, bid_adapter: &dyn VenueAdapter) {
    for attempt in 0..MAX_VERIFY_POLLS {
        let sleep_secs = VERIFY_BASE_SLEEP_SECS + VERIFY_SLEEP_STEP_SECS * attempt as f64;
        tokio::time::sleep(Duration::from_secs_f64(sleep_secs)).await;

        if trade.ask.status != OrderStatus::Filled {
            let _ = trade.ask.refresh_status(ask_adapter).await;
        }
        if trade.bid.status != OrderStatus::Filled {
            let _ = trade.bid.refresh_status(bid_adapter).await;
        }

        if trade.ask.status == OrderStatus::Filled && trade.bid.status == OrderStatus::Filled {
            let profit_quote = trade.bid.actual_quote_qty - trade.ask.actual_quote_qty;
            let profit_perc = if trade.bid.actual_quote_qty != 0.0 {
                100.0 * profit_quote / trade.bid.actual_quote_qty
            } else {
                0.0
            };
            trade.actual = Some(ActualProfit { profit_quote, profit_perc });
            trade.state = TradeState::Success;
            info!(trade_id = %trade.trade_id, profit_quote, profit_perc, "trade verified");
            return;
        }
    }

    warn!(trade_id = %trade.trade_id, "verification exhausted with an unfilled leg");
    trade.state = TradeState::Partial;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineThresholds;
    use crate::order::OrderRole;
    use crate::types::{FeeSchedule, OrderBookLevel, OrderBookSnapshot, Symbol};
    use crate::venue::SimulatedVenueAdapter;

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

    #[tokio::test]
    async fn accepted_trade_reaches_success() {
        let sym = Symbol::new("ETH", "USDT");
        let left = Arc::new(
            SimulatedVenueAdapter::new("left", FeeSchedule::new(0.002, 0.002)).with_balance("ETH", 100.0),
        );
        let right = Arc::new(
            SimulatedVenueAdapter::new("right", FeeSchedule::new(0.002, 0.002)).with_balance("USDT", 1_000_000.0),
        );
        left.set_book(OrderBookSnapshot::new(
            "left",
            sym.clone(),
            vec![],
            vec![OrderBookLevel::new(1015.0, 10.0)],
        ));
        right.set_book(OrderBookSnapshot::new(
            "right",
            sym.clone(),
            vec![OrderBookLevel::new(1006.0, 10.0)],
            vec![],
        ));

        let ask_snap = Arc::new(right.fetch_order_book(&sym, 20).await.unwrap());
        let bid_snap = Arc::new(left.fetch_order_book(&sym, 20).await.unwrap());
        let ask = OrderEntity::new(OrderRole::Ask, ask_snap, 0.002, 8, 8);
        let bid = OrderEntity::new(OrderRole::Bid, bid_snap, 0.002, 8, 8);

        let trade = run_trade(
            "left_right_eth_usdt".into(),
            ask,
            bid,
            1_000_000.0,
            100.0,
            &thresholds(),
            right.clone(),
            left.clone(),
            0,
        )
        .await;

        assert_eq!(trade.state, TradeState::Success);
        assert!(trade.actual.is_some());
    }

    #[tokio::test]
    async fn rejected_opportunity_never_places() {
        let sym = Symbol::new("ETH", "USDT");
        let same = Arc::new(SimulatedVenueAdapter::new("solo", FeeSchedule::new(0.0, 0.0)));
        same.set_book(OrderBookSnapshot::new(
            "solo",
            sym.clone(),
            vec![OrderBookLevel::new(100.0, 1.0)],
            vec![OrderBookLevel::new(99.0, 1.0)],
        ));
        let snap = Arc::new(same.fetch_order_book(&sym, 20).await.unwrap());
        let ask = OrderEntity::new(OrderRole::Ask, snap.clone(), 0.0, 8, 8);
        let bid = OrderEntity::new(OrderRole::Bid, snap, 0.0, 8, 8);

        let trade = run_trade(
            "solo_solo_eth_usdt".into(),
            ask,
            bid,
            1.0,
            1.0,
            &thresholds(),
            same.clone(),
            same.clone(),
            0,
        )
        .await;

        assert_eq!(trade.state, TradeState::Rejected);
        assert_eq!(trade.rejection, Some(EngineRejection::SameVenue));
    }
}
