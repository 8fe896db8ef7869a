//! Document store: a local embedded-SQLite stand-in for the external store named in
//! the interface spec. Three logical collections plus a market-pair ledger, realised
//! as four tables.
//!
//! Grounded on the teacher's `signals/db_storage.rs` and `vault/vault_db.rs`:
//! `rusqlite::Connection`, `CREATE TABLE IF NOT EXISTS` at construction, prepared
//! statements per operation, sub-documents serialized to a JSON text column
//! alongside indexed scalar columns used for lookups.

use std::path::Path;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trade::{Trade, TradeState};
use crate::types::Asset;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One leg's expected (pre-fill) figures, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedLeg {
    pub price: f64,
    pub price_with_fee: f64,
    pub base_quantity: f64,
    pub quote_quantity: f64,
    pub balance: f64,
}

/// One leg's actual (post-fill) figures, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActualLeg {
    pub exchange_order_id: Option<String>,
    pub price: f64,
    pub price_with_fee: f64,
    pub timestamp: i64,
    pub base_quantity: f64,
    pub filled: bool,
}

/// Full persisted shape of one trade-placement attempt, per §6's record layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTrade {
    pub trade_id: String,
    pub orders_verified: bool,
    pub timestamp: i64,
    pub ask_exchange: String,
    pub bid_exchange: String,
    pub market: String,
    pub order_quantity: f64,
    pub market_pair_id: String,
    pub expected_ask: Option<ExpectedLeg>,
    pub expected_bid: Option<ExpectedLeg>,
    pub expected_profit_percentage: Option<f64>,
    pub expected_profit_amount: Option<f64>,
    pub actual_ask: Option<ActualLeg>,
    pub actual_bid: Option<ActualLeg>,
    pub actual_profit_percentage: Option<f64>,
    pub actual_profit_amount: Option<f64>,
}

impl PersistedTrade {
    pub fn from_trade(trade: &Trade) -> Self {
        let expected_ask = trade.expected.map(|_| ExpectedLeg {
            price: trade.ask.price,
            price_with_fee: trade.ask.price_with_fee,
            base_quantity: trade.ask.base_qty,
            quote_quantity: trade.ask.quote_qty,
            balance: trade.ask_balance,
        });
        let expected_bid = trade.expected.map(|_| ExpectedLeg {
            price: trade.bid.price,
            price_with_fee: trade.bid.price_with_fee,
            base_quantity: trade.bid.base_qty,
            quote_quantity: trade.bid.quote_qty,
            balance: trade.bid_balance,
        });

        let actual_leg = |order: &crate::order::OrderEntity| ActualLeg {
            exchange_order_id: order.venue_order_id.clone(),
            price: order.actual_price,
            price_with_fee: order.actual_price_with_fee,
            timestamp: order.placed_at_ms.unwrap_or_default(),
            base_quantity: order.actual_base_qty,
            filled: order.status == crate::order::OrderStatus::Filled,
        };
        let legs_placed = matches!(
            trade.state,
            TradeState::Placing | TradeState::Verifying | TradeState::Cancelling | TradeState::Success | TradeState::Partial | TradeState::Aborted
        );

        Self {
            trade_id: trade.trade_id.clone(),
            orders_verified: trade.state == TradeState::Success,
            timestamp: trade.created_at_ms,
            ask_exchange: trade.ask.venue.clone(),
            bid_exchange: trade.bid.venue.clone(),
            market: trade.ask.symbol.to_string(),
            order_quantity: trade.expected.map(|d| d.order_base).unwrap_or(0.0),
            market_pair_id: trade.market_pair_id.clone(),
            expected_ask,
            expected_bid,
            expected_profit_percentage: trade.expected.map(|d| d.profit_perc),
            expected_profit_amount: trade.expected.map(|d| d.profit_quote),
            actual_ask: legs_placed.then(|| actual_leg(&trade.ask)),
            actual_bid: legs_placed.then(|| actual_leg(&trade.bid)),
            actual_profit_percentage: trade.actual.map(|a| a.profit_perc),
            actual_profit_amount: trade.actual.map(|a| a.profit_quote),
        }
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS trades (
                trade_id TEXT PRIMARY KEY,
                market_pair_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                orders_verified INTEGER NOT NULL,
                document TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trades_market_pair ON trades(market_pair_id);

            CREATE TABLE IF NOT EXISTS balance_current (
                venue TEXT NOT NULL,
                asset TEXT NOT NULL,
                amount REAL NOT NULL,
                PRIMARY KEY (venue, asset)
            );

            CREATE TABLE IF NOT EXISTS balance_history (
                venue TEXT NOT NULL,
                asset TEXT NOT NULL,
                amount REAL NOT NULL,
                refreshed_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_balance_history_venue_asset ON balance_history(venue, asset);

            CREATE TABLE IF NOT EXISTS market_pairs (
                market_pair_id TEXT PRIMARY KEY,
                first_run INTEGER NOT NULL,
                last_run INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn record_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let record = PersistedTrade::from_trade(trade);
        let document = serde_json::to_string(&record)?;
        self.conn.execute(
            "INSERT INTO trades (trade_id, market_pair_id, timestamp, orders_verified, document)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(trade_id) DO UPDATE SET orders_verified = excluded.orders_verified, document = excluded.document",
            params![
                record.trade_id,
                record.market_pair_id,
                record.timestamp,
                record.orders_verified as i64,
                document,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_balance_current(&self, venue: &str, asset: &Asset, amount: f64) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO balance_current (venue, asset, amount) VALUES (?1, ?2, ?3)
             ON CONFLICT(venue, asset) DO UPDATE SET amount = excluded.amount",
            params![venue, asset, amount],
        )?;
        Ok(())
    }

    pub fn append_balance_history(
        &self,
        venue: &str,
        asset: &Asset,
        amount: f64,
        refreshed_at_ms: i64,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO balance_history (venue, asset, amount, refreshed_at) VALUES (?1, ?2, ?3, ?4)",
            params![venue, asset, amount, refreshed_at_ms],
        )?;
        Ok(())
    }

    pub fn read_balance_current(&self, venue: &str) -> Result<Vec<(Asset, f64)>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT asset, amount FROM balance_current WHERE venue = ?1")?;
        let rows = stmt
            .query_map(params![venue], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn trade_count(&self) -> Result<i64, StoreError> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))?)
    }

    pub fn upsert_market_pair(&self, market_pair_id: &str, run_at_ms: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO market_pairs (market_pair_id, first_run, last_run) VALUES (?1, ?2, ?2)
             ON CONFLICT(market_pair_id) DO UPDATE SET last_run = excluded.last_run",
            params![market_pair_id, run_at_ms],
        )?;
        Ok(())
    }
}
