//! Book Collector: one per venue, keeping the freshest top-of-book snapshot.
//! Mission: the Dispatch Loop never blocks on a network call to see the latest price.
//!
//! Grounded on the teacher's `ArcSwap`-based last-value slot
//! (`scrapers::binance_book_ticker::SymbolState`): a lock-free publish slot plus an
//! edge-triggered changed flag, instead of a channel that could apply backpressure
//! to the writer.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{OrderBookSnapshot, Symbol};
use crate::venue::VenueAdapter;

/// How the collector obtains updates. Only `Request` is implemented; `Stream` is an
/// interface reserved for a future push-based integration (§4.2, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorType {
    Request,
    Stream,
}

const BOOK_DEPTH: usize = 20;

/// Holds exactly one latest snapshot per venue. Readers never block writers: a
/// writer publishes via `ArcSwap::store`, overwriting any unread previous value.
pub struct BookCollector {
    venue: String,
    symbol: Symbol,
    latest: ArcSwap<Option<OrderBookSnapshot>>,
    /// Edge-triggered: set when the new best price differs from the previous one,
    /// cleared by the consumer when it reads.
    changed: AtomicBool,
    shutdown: AtomicBool,
    sleep_time: Duration,
}

impl BookCollector {
    pub fn new(venue: impl Into<String>, symbol: Symbol, sleep_time: Duration) -> Arc<Self> {
        Arc::new(Self {
            venue: venue.into(),
            symbol,
            latest: ArcSwap::from_pointee(None),
            changed: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            sleep_time,
        })
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }

    /// Non-blocking read of the latest published snapshot.
    pub fn latest(&self) -> Option<OrderBookSnapshot> {
        (**self.latest.load()).clone()
    }

    /// Edge-triggered read-and-clear: returns whether the best price moved since the
    /// last call.
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    /// Causes the collector to stop before its next sleep.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn publish_if_changed(&self, snapshot: OrderBookSnapshot) {
        let prev = self.latest();
        let best_moved = match &prev {
            None => true,
            Some(prev) => {
                prev.best_ask().map(|l| l.price) != snapshot.best_ask().map(|l| l.price)
                    || prev.best_bid().map(|l| l.price) != snapshot.best_bid().map(|l| l.price)
            }
        };

        self.latest.store(Arc::new(Some(snapshot)));
        if best_moved {
            self.changed.store(true, Ordering::Release);
        }
    }

    /// REQUEST mode: sleep, fetch, publish on change, repeat, until shutdown.
    /// Snapshot publications within this collector are totally ordered; `run` never
    /// returns early on a fetch failure — per §4.1 that failure is non-fatal and the
    /// collector simply tries again next cycle.
    pub async fn run_request(self: Arc<Self>, adapter: Arc<dyn VenueAdapter>) {
        loop {
            if self.is_shutdown() {
                return;
            }
            if !self.sleep_time.is_zero() {
                tokio::time::sleep(self.sleep_time).await;
            }
            if self.is_shutdown() {
                return;
            }

            match adapter.fetch_order_book(&self.symbol, BOOK_DEPTH).await {
                Ok(snapshot) if snapshot.is_well_formed() => {
                    self.publish_if_changed(snapshot);
                }
                Ok(bad) => {
                    warn!(venue = %self.venue, symbol = %bad.symbol, "discarding malformed order book snapshot");
                }
                Err(err) => {
                    debug!(venue = %self.venue, error = %err, "order book fetch failed, skipping tick");
                }
            }
        }
    }
}
