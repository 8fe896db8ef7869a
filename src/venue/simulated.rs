//! In-memory venue used for `--simulate` runs and for tests.
//! Mission: exercise the rest of the system against a scripted book without ever
//! reaching the network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{AdapterError, AdapterErrorKind, OrderStatusReport, PlacementResult, VenueAdapter};
use crate::types::{Asset, FeeSchedule, MarketMeta, OrderBookSnapshot, OrderSide, Symbol};

struct PendingOrder {
    symbol: Symbol,
    base_qty: f64,
    price: f64,
}

/// A fixed order book, fee schedule and balance set, wired into a [`VenueAdapter`].
/// `place_order` always accepts and fills immediately at the requested price — it
/// exists to drive the Trade Controller deterministically, not to model slippage.
pub struct SimulatedVenueAdapter {
    venue: String,
    markets: HashMap<String, MarketMeta>,
    books: Mutex<HashMap<String, OrderBookSnapshot>>,
    fees: FeeSchedule,
    balances: Mutex<HashMap<Asset, f64>>,
    pending: Mutex<HashMap<String, PendingOrder>>,
    next_order_id: Mutex<u64>,
}

impl SimulatedVenueAdapter {
    pub fn new(venue: impl Into<String>, fees: FeeSchedule) -> Self {
        Self {
            venue: venue.into(),
            markets: HashMap::new(),
            books: Mutex::new(HashMap::new()),
            fees,
            balances: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_order_id: Mutex::new(1),
        }
    }

    pub fn with_market(mut self, symbol: Symbol, meta: MarketMeta) -> Self {
        self.markets.insert(symbol.to_string(), meta);
        self
    }

    pub fn with_balance(self, asset: impl Into<String>, amount: f64) -> Self {
        self.balances.lock().insert(asset.into(), amount);
        self
    }

    pub fn set_book(&self, snapshot: OrderBookSnapshot) {
        self.books
            .lock()
            .insert(snapshot.symbol.to_string(), snapshot);
    }
}

#[async_trait]
impl VenueAdapter for SimulatedVenueAdapter {
    fn venue_id(&self) -> &str {
        &self.venue
    }

    async fn fetch_markets(&self) -> Result<Vec<(Symbol, MarketMeta)>, AdapterError> {
        Ok(self
            .markets
            .iter()
            .filter_map(|(sym, meta)| Symbol::parse(sym).map(|s| (s, meta.clone())))
            .collect())
    }

    async fn fetch_balance(&self) -> Result<HashMap<Asset, f64>, AdapterError> {
        Ok(self.balances.lock().clone())
    }

    async fn fetch_order_book(&self, symbol: &Symbol, _depth: usize) -> Result<OrderBookSnapshot, AdapterError> {
        self.books
            .lock()
            .get(&symbol.to_string())
            .cloned()
            .ok_or_else(|| AdapterError::new(&self.venue, AdapterErrorKind::VenueRejected, "no book for symbol"))
    }

    async fn fetch_fees(&self, _symbol: &Symbol) -> Result<FeeSchedule, AdapterError> {
        Ok(self.fees)
    }

    async fn place_order(
        &self,
        _client_order_id: &str,
        symbol: &Symbol,
        _side: OrderSide,
        base_qty: f64,
        price: f64,
    ) -> Result<PlacementResult, AdapterError> {
        let mut next_id = self.next_order_id.lock();
        let venue_order_id = format!("{}-sim-{}", self.venue, *next_id);
        *next_id += 1;
        drop(next_id);

        self.pending.lock().insert(
            venue_order_id.clone(),
            PendingOrder {
                symbol: symbol.clone(),
                base_qty,
                price,
            },
        );

        Ok(PlacementResult {
            accepted: true,
            venue_order_id,
        })
    }

    async fn cancel_order(&self, venue_order_id: &str, _symbol: &Symbol) -> Result<bool, AdapterError> {
        Ok(self.pending.lock().remove(venue_order_id).is_some())
    }

    async fn fetch_order_status(
        &self,
        venue_order_id: &str,
        _symbol: &Symbol,
    ) -> Result<Option<OrderStatusReport>, AdapterError> {
        let order = self.pending.lock().remove(venue_order_id);
        Ok(order.map(|o| OrderStatusReport {
            price: o.price,
            base_qty: o.base_qty,
            fee_in_quote: None,
            timestamp_ms: 0,
            filled: true,
        }))
    }
}
