//! Balance Cache: the single mutable shared structure in the system.
//! Mission: the Dispatch Loop reads a consistent per-venue balance snapshot without
//! ever locking out a concurrent read.
//!
//! Grounded on the teacher's `ArcSwap` slot pattern (same technique as
//! [`crate::book::BookCollector`]), applied to a whole-map snapshot-replacement
//! instead of a single best-price value.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::Asset;

/// Per-venue available balances. Writes originate only from the Dispatch Loop;
/// reads never block a concurrent write (§4.7, §5).
pub struct BalanceCache {
    venue: String,
    snapshot: ArcSwap<HashMap<Asset, f64>>,
}

impl BalanceCache {
    pub fn new(venue: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            snapshot: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }

    /// Atomically replaces the whole map, e.g. after a venue or document-store refresh.
    pub fn replace(&self, snapshot: HashMap<Asset, f64>) {
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn get(&self, asset: &str) -> f64 {
        self.snapshot.load().get(asset).copied().unwrap_or(0.0)
    }

    pub fn snapshot(&self) -> HashMap<Asset, f64> {
        (**self.snapshot.load()).clone()
    }

    /// Applies a local debit after a confirmed fill, without waiting for the next
    /// venue refresh. Clamped at zero: a debit can never drive a balance negative in
    /// the cache, since the venue is the source of truth on the next refresh.
    pub fn debit(&self, asset: &str, amount: f64) {
        let mut next = self.snapshot();
        let entry = next.entry(asset.to_string()).or_insert(0.0);
        *entry = (*entry - amount).max(0.0);
        self.replace(next);
    }
}
