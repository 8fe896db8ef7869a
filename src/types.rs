//! Shared data model: assets, symbols, market metadata and order-book snapshots.
//! Mission: one vocabulary the engine, the collectors and the venue adapters all speak.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Free-form uppercase ticker, e.g. "BTC" or "USDT".
pub type Asset = String;

/// Ordered pair (base, quote), rendered "BASE/QUOTE". Immutable identifier of a market.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub base: Asset,
    pub quote: Asset,
}

impl Symbol {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Parses "BASE/QUOTE". Returns `None` if the separator is missing or either side is empty.
    pub fn parse(raw: &str) -> Option<Self> {
        let (base, quote) = raw.split_once('/')?;
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some(Self::new(base, quote))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Per-venue descriptor of a [`Symbol`]: precision and minimum order-size constraints.
/// Populated once at startup from [`crate::venue::VenueAdapter::fetch_markets`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMeta {
    pub min_base_qty: f64,
    pub min_quote_qty: f64,
    pub base_precision: u32,
    pub quote_precision: u32,
    pub price_precision: u32,
}

/// One level of an order book: a price and the base-asset quantity resting there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub base_qty: f64,
}

impl OrderBookLevel {
    pub fn new(price: f64, base_qty: f64) -> Self {
        Self { price, base_qty }
    }
}

/// Immutable top-of-book snapshot for one venue and symbol. `asks` ascend by price,
/// `bids` descend by price. A new best price produces a new snapshot, never a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub symbol: Symbol,
    pub venue: String,
    pub asks: Vec<OrderBookLevel>,
    pub bids: Vec<OrderBookLevel>,
}

impl OrderBookSnapshot {
    pub fn new(
        venue: impl Into<String>,
        symbol: Symbol,
        asks: Vec<OrderBookLevel>,
        bids: Vec<OrderBookLevel>,
    ) -> Self {
        Self {
            symbol,
            venue: venue.into(),
            asks,
            bids,
        }
    }

    pub fn best_ask(&self) -> Option<OrderBookLevel> {
        self.asks.first().copied()
    }

    pub fn best_bid(&self) -> Option<OrderBookLevel> {
        self.bids.first().copied()
    }

    /// Data-integrity check per the error taxonomy: finite, non-negative, correctly
    /// ordered, and not crossed at the best level. A `false` result means the snapshot
    /// must be discarded and the tick skipped, never passed to the engine.
    pub fn is_well_formed(&self) -> bool {
        let finite_and_nonneg =
            |lvl: &OrderBookLevel| lvl.price.is_finite() && lvl.base_qty.is_finite() && lvl.price >= 0.0 && lvl.base_qty >= 0.0;

        if !self.asks.iter().all(finite_and_nonneg) || !self.bids.iter().all(finite_and_nonneg) {
            return false;
        }
        if !self.asks.windows(2).all(|w| w[0].price <= w[1].price) {
            return false;
        }
        if !self.bids.windows(2).all(|w| w[0].price >= w[1].price) {
            return false;
        }
        if let (Some(ask), Some(bid)) = (self.best_ask(), self.best_bid()) {
            if ask.price <= bid.price {
                return false;
            }
        }
        true
    }
}

/// Maker/taker proportions, e.g. `0.002` means 0.2%.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker_rate: f64,
    pub taker_rate: f64,
}

impl FeeSchedule {
    pub fn new(maker_rate: f64, taker_rate: f64) -> Self {
        Self {
            maker_rate,
            taker_rate,
        }
    }
}

/// Side of an order placed with a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Canonical id joining the sorted venue ids with the symbol, stable across restarts.
pub fn market_pair_key(venue_a: &str, venue_b: &str, symbol: &Symbol) -> String {
    let mut venues = [venue_a, venue_b];
    venues.sort_unstable();
    format!("{}_{}_{}", venues[0], venues[1], symbol).to_uppercase()
}

/// Rounds `value` down towards zero to `precision` decimal places. Used for every
/// price presented to a venue and every base/quote quantity the engine commits to.
pub fn round_down(value: f64, precision: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(precision as i32);
    (value * factor).floor() / factor
}

/// Rounds `value` to the nearest `precision` decimal places (half away from zero).
/// Used where the spec calls for plain rounding rather than a floor, e.g. deriving
/// actual fill prices from venue fee reports.
pub fn round_nearest(value: f64, precision: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_parses_and_displays() {
        let s = Symbol::parse("btc/usdt").unwrap();
        assert_eq!(s.base, "BTC");
        assert_eq!(s.quote, "USDT");
        assert_eq!(s.to_string(), "BTC/USDT");
    }

    #[test]
    fn symbol_parse_rejects_malformed() {
        assert!(Symbol::parse("BTCUSDT").is_none());
        assert!(Symbol::parse("/USDT").is_none());
    }

    #[test]
    fn round_down_floors_towards_zero() {
        assert_eq!(round_down(70.6614444, 2), 70.66);
        assert_eq!(round_down(1.999, 0), 1.0);
    }

    #[test]
    fn market_pair_key_is_order_independent() {
        let sym = Symbol::new("ETH", "USDT");
        assert_eq!(
            market_pair_key("kraken", "binance", &sym),
            market_pair_key("binance", "kraken", &sym)
        );
    }

    #[test]
    fn well_formed_snapshot_rejects_crossed_book() {
        let sym = Symbol::new("ETH", "USDT");
        let snap = OrderBookSnapshot::new(
            "binance",
            sym,
            vec![OrderBookLevel::new(100.0, 1.0)],
            vec![OrderBookLevel::new(101.0, 1.0)],
        );
        assert!(!snap.is_well_formed());
    }
}
