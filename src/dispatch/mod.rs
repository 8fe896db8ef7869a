//! Dispatch Loop: the single-threaded decision loop that ties the collectors, the
//! engine, the trade controller and the balance cache together.
//! Mission: one thread, one writer to the trades table, one caller of the engine —
//! no locking required inside the hot path (§4.6, §5).
//!
//! Grounded on `original_source/trader/looper.py`'s `CryptonLooper`: the tick
//! counter and its 1,000/10,000-tick balance-refresh thresholds, the post-trade
//! cooldown sleep, and the changed-flag-gated evaluate step all come from there.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::balance::BalanceCache;
use crate::book::BookCollector;
use crate::engine::EngineThresholds;
use crate::order::{OrderEntity, OrderRole};
use crate::store::Store;
use crate::trade::{run_trade, TradeState};
use crate::types::{FeeSchedule, Symbol};
use crate::venue::VenueAdapter;

const BALANCE_STORE_REFRESH_TICKS: u64 = 1_000;
const BALANCE_VENUE_REFRESH_TICKS: u64 = 10_000;
const DEFAULT_POST_TRADE_SLEEP: Duration = Duration::from_secs(2);

pub struct DispatchLoop {
    pub symbol: Symbol,
    pub market_pair_id: String,

    pub ask_collector: Arc<BookCollector>,
    pub bid_collector: Arc<BookCollector>,
    pub ask_adapter: Arc<dyn VenueAdapter>,
    pub bid_adapter: Arc<dyn VenueAdapter>,

    pub ask_fee: FeeSchedule,
    pub bid_fee: FeeSchedule,
    pub ask_price_precision: u32,
    pub bid_price_precision: u32,

    pub ask_balance_cache: BalanceCache,
    pub bid_balance_cache: BalanceCache,
    pub ask_base_asset_for_bid_cap: String,
    pub ask_quote_asset_for_ask_cap: String,

    pub thresholds: EngineThresholds,
    pub store: Store,

    pub tick_sleep: Duration,
    pub post_trade_sleep: Duration,
    pub shutdown: Arc<AtomicBool>,
}

impl DispatchLoop {
    /// One iteration of the §4.6 loop. `tick` is the caller-owned counter and
    /// `now_ms` a caller-supplied timestamp, since this crate never calls
    /// wall-clock time internally.
    pub async fn tick(&mut self, tick: u64, now_ms: i64) {
        if tick % BALANCE_VENUE_REFRESH_TICKS == 0 {
            self.refresh_balances_from_venue(now_ms).await;
        } else if tick % BALANCE_STORE_REFRESH_TICKS == 0 {
            self.refresh_balances_from_store();
        }

        if !self.tick_sleep.is_zero() {
            tokio::time::sleep(self.tick_sleep).await;
        }

        let ask_changed = self.ask_collector.take_changed();
        let bid_changed = self.bid_collector.take_changed();
        if !ask_changed && !bid_changed {
            return;
        }

        let (Some(ask_snapshot), Some(bid_snapshot)) = (self.ask_collector.latest(), self.bid_collector.latest())
        else {
            return;
        };

        let ask_balance = self.ask_balance_cache.get(&self.ask_quote_asset_for_ask_cap);
        let bid_balance = self.bid_balance_cache.get(&self.ask_base_asset_for_bid_cap);

        let ask = OrderEntity::new(
            OrderRole::Ask,
            Arc::new(ask_snapshot),
            self.ask_fee.taker_rate,
            self.ask_price_precision,
            self.thresholds.quote_precision,
        );
        let bid = OrderEntity::new(
            OrderRole::Bid,
            Arc::new(bid_snapshot),
            self.bid_fee.taker_rate,
            self.bid_price_precision,
            self.thresholds.quote_precision,
        );

        let trade = run_trade(
            self.market_pair_id.clone(),
            ask,
            bid,
            ask_balance,
            bid_balance,
            &self.thresholds,
            self.ask_adapter.clone(),
            self.bid_adapter.clone(),
            now_ms,
        )
        .await;

        if let Err(err) = self.store.record_trade(&trade) {
            error!(error = %err, "failed to persist trade record");
        }
        if let Err(err) = self.store.upsert_market_pair(&self.market_pair_id, now_ms) {
            error!(error = %err, "failed to upsert market pair ledger");
        }

        match trade.state {
            TradeState::Success | TradeState::Partial => {
                if let Some((ask_quote_debit, bid_base_debit)) = trade.fill_debits() {
                    self.ask_balance_cache.debit(&self.ask_quote_asset_for_ask_cap, ask_quote_debit);
                    self.bid_balance_cache.debit(&self.ask_base_asset_for_bid_cap, bid_base_debit);
                }
                info!(trade_id = %trade.trade_id, state = ?trade.state, "trade reached terminal fill state");
                if !self.post_trade_sleep.is_zero() {
                    tokio::time::sleep(self.post_trade_sleep).await;
                }
                self.refresh_balances_from_venue(now_ms).await;
            }
            TradeState::Aborted => {
                warn!(trade_id = %trade.trade_id, "trade aborted");
            }
            TradeState::Rejected => {
                // Rejections at evaluation are routine and already logged by the engine.
            }
            _ => {}
        }
    }

    async fn refresh_balances_from_venue(&mut self, now_ms: i64) {
        if let Ok(balances) = self.ask_adapter.fetch_balance().await {
            for (asset, amount) in &balances {
                let _ = self.store.upsert_balance_current(self.ask_collector.venue(), asset, *amount);
                let _ = self.store.append_balance_history(self.ask_collector.venue(), asset, *amount, now_ms);
            }
            self.ask_balance_cache.replace(balances);
        }
        if let Ok(balances) = self.bid_adapter.fetch_balance().await {
            for (asset, amount) in &balances {
                let _ = self.store.upsert_balance_current(self.bid_collector.venue(), asset, *amount);
                let _ = self.store.append_balance_history(self.bid_collector.venue(), asset, *amount, now_ms);
            }
            self.bid_balance_cache.replace(balances);
        }
    }

    fn refresh_balances_from_store(&mut self) {
        if let Ok(rows) = self.store.read_balance_current(self.ask_collector.venue()) {
            self.ask_balance_cache.replace(rows.into_iter().collect());
        }
        if let Ok(rows) = self.store.read_balance_current(self.bid_collector.venue()) {
            self.bid_balance_cache.replace(rows.into_iter().collect());
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

pub fn default_post_trade_sleep() -> Duration {
    DEFAULT_POST_TRADE_SLEEP
}
