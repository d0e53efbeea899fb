//! Cache statistics

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Reads served from the cache
    pub hits: u64,
    /// Reads that had to be executed
    pub misses: u64,
    /// Results kept after a miss
    pub stores: u64,
    /// Results not kept (zero TTL or raced by an invalidation)
    pub skipped_stores: u64,
    /// Tags flushed by writes
    pub invalidated_tags: u64,
    /// Statements passed straight to the executor
    pub bypasses: u64,
    /// Statements whose tags came from the fallback path
    pub degraded_parses: u64,
    /// Store failures absorbed by the coordinator
    pub store_errors: u64,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Format stats as summary string
    pub fn summary(&self) -> String {
        format!(
            "hits: {}, misses: {}, hit rate: {:.1}%, stores: {}, invalidated tags: {}, bypasses: {}",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.stores,
            self.invalidated_tags,
            self.bypasses
        )
    }
}

/// Lock-free counters behind [`CacheStats`]
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    skipped_stores: AtomicU64,
    invalidated_tags: AtomicU64,
    bypasses: AtomicU64,
    degraded_parses: AtomicU64,
    store_errors: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stored(&self, stored: bool) {
        if stored {
            self.stores.fetch_add(1, Ordering::Relaxed);
        } else {
            self.skipped_stores.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn invalidated(&self, tags: usize) {
        self.invalidated_tags.fetch_add(tags as u64, Ordering::Relaxed);
    }

    pub(crate) fn bypass(&self) {
        self.bypasses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn degraded(&self) {
        self.degraded_parses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            skipped_stores: self.skipped_stores.load(Ordering::Relaxed),
            invalidated_tags: self.invalidated_tags.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            degraded_parses: self.degraded_parses.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}
