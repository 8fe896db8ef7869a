//! Order Entity: side-aware price/quantity arithmetic over one venue's order book.
//! Mission: ASK and BID are the same shape with two small differences — which way
//! the fee pushes the price and which direction the walk stops in.
//!
//! Grounded on `original_source/orders.py`'s `OrderBase`/`BestOrderAsk`/`BestOrderBid`
//! split, re-expressed per §9 "Role polymorphism" as a tagged `OrderRole` instead of
//! inheritance.

use std::sync::Arc;

use tracing::error;

use crate::types::{round_down, round_nearest, OrderBookSnapshot, OrderSide, Symbol};
use crate::venue::{AdapterError, OrderStatusReport, VenueAdapter};

/// ASK means "we BUY at the ask price"; BID means "we SELL at the bid price".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRole {
    Ask,
    Bid,
}

impl OrderRole {
    fn order_side(self) -> OrderSide {
        match self {
            OrderRole::Ask => OrderSide::Buy,
            OrderRole::Bid => OrderSide::Sell,
        }
    }
}

/// Monotonic per-entity state. `None -> Active` is the only origin; `Filled` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    None,
    Active,
    Failed,
    Filled,
}

/// A cap applied to one side of an opportunity walk. Never both at once (§4.3).
#[derive(Debug, Clone, Copy)]
pub enum QtyCap {
    MaxBase(f64),
    MaxQuote(f64),
}

/// One leg of a candidate (or live) arbitrage trade.
pub struct OrderEntity {
    pub symbol: Symbol,
    pub venue: String,
    pub role: OrderRole,
    snapshot: Arc<OrderBookSnapshot>,
    fee_rate: f64,
    price_precision: u32,
    quote_precision: u32,

    // Computed planning state, populated by `calculate_opportunity`.
    pub price: f64,
    pub price_with_fee: f64,
    pub base_qty: f64,
    pub quote_qty: f64,
    pub found: bool,

    // Execution state.
    pub venue_order_id: Option<String>,
    pub placed_at_ms: Option<i64>,
    pub status: OrderStatus,
    pub actual_price: f64,
    pub actual_price_with_fee: f64,
    pub actual_base_qty: f64,
    pub actual_quote_qty: f64,
}

impl OrderEntity {
    pub fn new(
        role: OrderRole,
        snapshot: Arc<OrderBookSnapshot>,
        taker_fee_rate: f64,
        price_precision: u32,
        quote_precision: u32,
    ) -> Self {
        Self {
            symbol: snapshot.symbol.clone(),
            venue: snapshot.venue.clone(),
            role,
            snapshot,
            fee_rate: taker_fee_rate,
            price_precision,
            quote_precision,
            price: 0.0,
            price_with_fee: 0.0,
            base_qty: 0.0,
            quote_qty: 0.0,
            found: false,
            venue_order_id: None,
            placed_at_ms: None,
            status: OrderStatus::None,
            actual_price: 0.0,
            actual_price_with_fee: 0.0,
            actual_base_qty: 0.0,
            actual_quote_qty: 0.0,
        }
    }

    fn book(&self) -> &[crate::types::OrderBookLevel] {
        match self.role {
            OrderRole::Ask => &self.snapshot.asks,
            OrderRole::Bid => &self.snapshot.bids,
        }
    }

    /// For ASK: `price * (1 + fee)`. For BID: `price * (1 - fee)`. Rounded down to
    /// the venue's price precision.
    pub fn fee_adjusted_price(&self, price: f64) -> f64 {
        let adjusted = match self.role {
            OrderRole::Ask => price * (1.0 + self.fee_rate),
            OrderRole::Bid => price * (1.0 - self.fee_rate),
        };
        round_down(adjusted, self.price_precision)
    }

    /// True once `self.fee_adjusted_price(candidate)` no longer beats `p_opp`: for
    /// ASK that means `candidate_fee >= p_opp`, for BID `candidate_fee <= p_opp`.
    fn arbitrage_exhausted(&self, candidate_fee: f64, p_opp: f64) -> bool {
        match self.role {
            OrderRole::Ask => candidate_fee >= p_opp,
            OrderRole::Bid => candidate_fee <= p_opp,
        }
    }

    pub fn first_price(&self) -> Option<f64> {
        self.book().first().map(|l| l.price)
    }

    pub fn first_price_with_fee(&self) -> Option<f64> {
        self.first_price().map(|p| self.fee_adjusted_price(p))
    }

    /// Fee-adjusted price used for ranking this entity against a same-role peer:
    /// the actual fill price once FILLED, the planned price once an opportunity is
    /// set, otherwise the book's best level.
    pub fn comparison_price(&self) -> f64 {
        if self.status == OrderStatus::Filled {
            self.actual_price_with_fee
        } else if self.found {
            self.price_with_fee
        } else {
            self.first_price_with_fee().unwrap_or(f64::NAN)
        }
    }

    /// Runs the opportunity walk against the opposite venue's fee-adjusted first
    /// price, under at most one of `max_base_qty`/`max_quote_qty`. Overwrites the
    /// entity's planning state; callers re-run this for mutual recalibration.
    pub fn calculate_opportunity(&mut self, p_opp: f64, cap: Option<QtyCap>) {
        let mut base_qty = 0.0_f64;
        let mut quote_qty = 0.0_f64;
        let mut found = false;
        let mut last_price = 0.0_f64;
        let mut last_price_with_fee = 0.0_f64;

        let mut remaining_base = match cap {
            Some(QtyCap::MaxBase(v)) => Some(v),
            _ => None,
        };
        let mut remaining_quote = match cap {
            Some(QtyCap::MaxQuote(v)) => Some(v),
            _ => None,
        };

        for level in self.book() {
            let price_fee = self.fee_adjusted_price(level.price);
            if self.arbitrage_exhausted(price_fee, p_opp) {
                break;
            }

            let mut take_base = level.base_qty;
            let mut take_quote = price_fee * level.base_qty;

            if let Some(remaining) = remaining_quote {
                if take_quote > remaining {
                    let scale = if take_quote > 0.0 { remaining / take_quote } else { 0.0 };
                    take_base *= scale;
                    take_quote *= scale;
                }
            }
            if let Some(remaining) = remaining_base {
                if take_base > remaining {
                    let scale = if take_base > 0.0 { remaining / take_base } else { 0.0 };
                    take_base *= scale;
                    take_quote *= scale;
                }
            }

            base_qty += take_base;
            quote_qty += take_quote;
            last_price = level.price;
            last_price_with_fee = price_fee;
            found = true;

            if let Some(remaining) = remaining_quote.as_mut() {
                *remaining -= take_quote;
                if *remaining <= 0.0 {
                    break;
                }
            }
            if let Some(remaining) = remaining_base.as_mut() {
                *remaining -= take_base;
                if *remaining <= 0.0 {
                    break;
                }
            }
        }

        self.base_qty = base_qty;
        self.quote_qty = quote_qty;
        self.found = found;
        self.price = round_down(last_price, self.price_precision);
        self.price_with_fee = round_down(last_price_with_fee, self.price_precision);
    }

    /// Transitions `None -> Active`, invokes the adapter, records the venue order id,
    /// and transitions to `Failed` on rejection.
    async fn place(
        &mut self,
        adapter: &dyn VenueAdapter,
        client_order_id: &str,
        base_qty: f64,
        price: f64,
    ) -> Result<bool, AdapterError> {
        if self.status != OrderStatus::None {
            error!(
                symbol = %self.symbol,
                venue = %self.venue,
                status = ?self.status,
                "order entity placed twice, monotonic status invariant violated, terminating"
            );
            std::process::exit(1);
        }
        self.status = OrderStatus::Active;
        let result = adapter
            .place_order(client_order_id, &self.symbol, self.role.order_side(), base_qty, price)
            .await?;
        self.venue_order_id = Some(result.venue_order_id);
        if !result.accepted {
            self.status = OrderStatus::Failed;
        }
        Ok(result.accepted)
    }

    pub async fn buy(
        &mut self,
        adapter: &dyn VenueAdapter,
        client_order_id: &str,
        base_qty: f64,
        price: f64,
    ) -> Result<bool, AdapterError> {
        self.place(adapter, client_order_id, base_qty, price).await
    }

    pub async fn sell(
        &mut self,
        adapter: &dyn VenueAdapter,
        client_order_id: &str,
        base_qty: f64,
        price: f64,
    ) -> Result<bool, AdapterError> {
        self.place(adapter, client_order_id, base_qty, price).await
    }

    pub async fn cancel(&self, adapter: &dyn VenueAdapter) -> Result<bool, AdapterError> {
        match &self.venue_order_id {
            Some(id) => adapter.cancel_order(id, &self.symbol).await,
            None => Ok(false),
        }
    }

    /// Polls `fetch_order_status` and updates actual fill state. A `None` result or
    /// a report missing a usable price leaves state untouched — "still
    /// indeterminate, poll again" (§4.1).
    pub async fn refresh_status(&mut self, adapter: &dyn VenueAdapter) -> Result<(), AdapterError> {
        let venue_order_id = match &self.venue_order_id {
            Some(id) => id.clone(),
            None => return Ok(()),
        };
        let report: Option<OrderStatusReport> = adapter.fetch_order_status(&venue_order_id, &self.symbol).await?;
        let Some(report) = report else { return Ok(()) };

        self.actual_price = report.price;
        self.actual_base_qty = report.base_qty;
        self.actual_price_with_fee = match report.fee_in_quote {
            Some(fee_in_quote) if report.base_qty != 0.0 => {
                round_nearest(report.price + (fee_in_quote / report.base_qty), self.price_precision)
            }
            _ => self.fee_adjusted_price(report.price),
        };
        self.actual_quote_qty = round_nearest(self.actual_base_qty * self.actual_price_with_fee, self.quote_precision);
        self.placed_at_ms = Some(report.timestamp_ms);

        if report.filled {
            self.status = OrderStatus::Filled;
        }
        Ok(())
    }
}

/// "lower is better" for ASK: `min` selects the cheaper venue to buy on.
pub fn better_ask<'a>(a: &'a OrderEntity, b: &'a OrderEntity) -> &'a OrderEntity {
    debug_assert_eq!(a.role, OrderRole::Ask);
    debug_assert_eq!(b.role, OrderRole::Ask);
    match a.comparison_price().partial_cmp(&b.comparison_price()) {
        Some(std::cmp::Ordering::Greater) => b,
        Some(_) => a,
        None => a,
    }
}

/// "higher is better" for BID: `max` selects the richer venue to sell on.
pub fn better_bid<'a>(a: &'a OrderEntity, b: &'a OrderEntity) -> &'a OrderEntity {
    debug_assert_eq!(a.role, OrderRole::Bid);
    debug_assert_eq!(b.role, OrderRole::Bid);
    match a.comparison_price().partial_cmp(&b.comparison_price()) {
        Some(std::cmp::Ordering::Less) => b,
        Some(_) => a,
        None => a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderBookLevel;

    fn ask_entity(levels: Vec<(f64, f64)>, fee: f64) -> OrderEntity {
        let snapshot = Arc::new(OrderBookSnapshot::new(
            "v",
            Symbol::new("ETH", "USDT"),
            levels.into_iter().map(|(p, q)| OrderBookLevel::new(p, q)).collect(),
            vec![],
        ));
        OrderEntity::new(OrderRole::Ask, snapshot, fee, 8, 8)
    }

    fn bid_entity(levels: Vec<(f64, f64)>, fee: f64) -> OrderEntity {
        let snapshot = Arc::new(OrderBookSnapshot::new(
            "v",
            Symbol::new("ETH", "USDT"),
            vec![],
            levels.into_iter().map(|(p, q)| OrderBookLevel::new(p, q)).collect(),
        ));
        OrderEntity::new(OrderRole::Bid, snapshot, fee, 8, 8)
    }

    #[test]
    fn fee_adjusted_price_matches_role_direction() {
        let ask = ask_entity(vec![(1000.0, 1.0)], 0.002);
        assert!((ask.fee_adjusted_price(1000.0) - 1002.0).abs() < 1e-9);

        let bid = bid_entity(vec![(1000.0, 1.0)], 0.002);
        assert!((bid.fee_adjusted_price(1000.0) - 998.0).abs() < 1e-9);
    }

    #[test]
    fn opportunity_walk_stops_when_arbitrage_exhausted() {
        let mut ask = ask_entity(vec![(1006.0, 10.0), (1007.0, 20.0), (1200.0, 1000.0)], 0.002);
        // opposite (BID) fee-adjusted first price well below the third level.
        ask.calculate_opportunity(1015.0, None);
        assert!(ask.found);
        assert!(ask.base_qty < 31.0);
    }

    #[test]
    fn base_cap_scales_partial_level() {
        let mut bid = bid_entity(vec![(1015.0, 10.0), (1014.0, 20.0)], 0.002);
        bid.calculate_opportunity(1000.0, Some(QtyCap::MaxBase(15.0)));
        assert!((bid.base_qty - 15.0).abs() < 1e-6);
    }

    #[test]
    fn better_ask_picks_cheaper_venue() {
        let cheap = ask_entity(vec![(1000.0, 1.0)], 0.0);
        let expensive = ask_entity(vec![(1010.0, 1.0)], 0.0);
        assert!(std::ptr::eq(better_ask(&cheap, &expensive), &cheap));
    }

    #[test]
    fn better_bid_picks_richer_venue() {
        let rich = bid_entity(vec![(1010.0, 1.0)], 0.0);
        let poor = bid_entity(vec![(1000.0, 1.0)], 0.0);
        assert!(std::ptr::eq(better_bid(&rich, &poor), &rich));
    }
}
