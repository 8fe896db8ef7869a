//! Venue Adapter: the uniform contract over a single exchange.
//! Mission: every venue integration, however different its wire format, looks the
//! same to the engine above it.

mod simulated;

pub use simulated::SimulatedVenueAdapter;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::types::{Asset, FeeSchedule, MarketMeta, OrderBookSnapshot, OrderSide, Symbol};

/// Sub-kind of an [`AdapterError`]. Adapters never propagate exceptions across the
/// engine boundary — every failure is this enum, attached to a `Result::Err` or
/// logged and turned into a `None`/`false` return per the method's documented
/// failure semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdapterErrorKind {
    #[error("network error")]
    Network,
    #[error("authentication error")]
    Authentication,
    #[error("rate limited")]
    RateLimit,
    #[error("venue rejected the request")]
    VenueRejected,
    #[error("request timed out")]
    Timeout,
}

#[derive(Debug, Error)]
#[error("adapter error ({kind}) on {venue}: {message}")]
pub struct AdapterError {
    pub venue: String,
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl AdapterError {
    pub fn new(venue: impl Into<String>, kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Result of a `place_order` call. `accepted = false` means the venue rejected the
/// request outright; the opposite leg of a trade must then be treated as at risk.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementResult {
    pub accepted: bool,
    pub venue_order_id: String,
}

/// Result of polling a previously placed order. A `None` from
/// [`VenueAdapter::fetch_order_status`] or a result with `price = None` both mean
/// "still indeterminate, poll again" — never a hard failure.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusReport {
    pub price: f64,
    pub base_qty: f64,
    pub fee_in_quote: Option<f64>,
    pub timestamp_ms: i64,
    pub filled: bool,
}

/// Uniform capability set over one exchange. Implementors must never let an
/// exception cross this boundary: every method returns a `Result` whose `Err` is an
/// [`AdapterError`], or an `Option`/`bool` per the §4.1 failure semantics.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Stable identifier for this venue, e.g. "binance", "kraken".
    fn venue_id(&self) -> &str;

    async fn fetch_markets(&self) -> Result<Vec<(Symbol, MarketMeta)>, AdapterError>;

    /// Available amounts per asset. Must never include locked/reserved balances.
    async fn fetch_balance(&self) -> Result<HashMap<Asset, f64>, AdapterError>;

    /// Top-`depth` levels, asks ascending, bids descending. `fetch_order_book`
    /// failures are non-fatal to the system: the caller should skip the tick.
    async fn fetch_order_book(&self, symbol: &Symbol, depth: usize) -> Result<OrderBookSnapshot, AdapterError>;

    /// One-shot at startup. Implementors may return a hard-coded fallback schedule
    /// if the venue refuses to answer.
    async fn fetch_fees(&self, symbol: &Symbol) -> Result<FeeSchedule, AdapterError>;

    /// Places a LIMIT order with IMMEDIATE-OR-CANCEL time-in-force. Executed at most
    /// once; never retried by the adapter.
    async fn place_order(
        &self,
        client_order_id: &str,
        symbol: &Symbol,
        side: OrderSide,
        base_qty: f64,
        price: f64,
    ) -> Result<PlacementResult, AdapterError>;

    /// Executed at most once; never retried by the adapter.
    async fn cancel_order(&self, venue_order_id: &str, symbol: &Symbol) -> Result<bool, AdapterError>;

    /// `Ok(None)` means indeterminate (poll again), not an error.
    async fn fetch_order_status(
        &self,
        venue_order_id: &str,
        symbol: &Symbol,
    ) -> Result<Option<OrderStatusReport>, AdapterError>;
}
