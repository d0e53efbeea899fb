//! Result cache over a tagged store

use super::storage::TaggedStore;
use super::types::{Payload, StoreOutcome};
use crate::error::{QueryCacheError, QueryCacheResult};
use crate::key::CacheKey;
use crate::tags::{ColumnSweep, Tag, TagSet};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const EPOCH_STRIPES: usize = 64;

/// Invalidation counters, striped by tag hash
///
/// A tag's stripe is bumped before the tag is flushed. Unrelated tags may
/// share a stripe, which only costs a skipped store.
#[derive(Debug)]
struct InvalidationEpochs {
    stripes: Vec<AtomicU64>,
    global: AtomicU64,
}

impl InvalidationEpochs {
    fn new() -> Self {
        Self {
            stripes: (0..EPOCH_STRIPES).map(|_| AtomicU64::new(0)).collect(),
            global: AtomicU64::new(0),
        }
    }

    fn stripe(tag: &Tag) -> usize {
        let mut hasher = DefaultHasher::new();
        tag.hash(&mut hasher);
        (hasher.finish() as usize) % EPOCH_STRIPES
    }

    fn bump(&self, tag: &Tag) {
        self.stripes[Self::stripe(tag)].fetch_add(1, Ordering::AcqRel);
    }

    fn bump_all(&self) {
        self.global.fetch_add(1, Ordering::AcqRel);
    }

    fn snapshot(&self, tags: &TagSet) -> EpochSnapshot {
        let mut stripes: Vec<usize> = tags.iter().map(Self::stripe).collect();
        stripes.sort_unstable();
        stripes.dedup();

        EpochSnapshot {
            global: self.global.load(Ordering::Acquire),
            stripes: stripes
                .into_iter()
                .map(|s| (s, self.stripes[s].load(Ordering::Acquire)))
                .collect(),
        }
    }

    fn unchanged_since(&self, snapshot: &EpochSnapshot) -> bool {
        self.global.load(Ordering::Acquire) == snapshot.global
            && snapshot
                .stripes
                .iter()
                .all(|(s, epoch)| self.stripes[*s].load(Ordering::Acquire) == *epoch)
    }
}

/// Invalidation state observed before a read executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochSnapshot {
    global: u64,
    stripes: Vec<(usize, u64)>,
}

/// Read-through result cache
///
/// Cheap to clone; clones share the store and the invalidation epochs.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn TaggedStore>,
    epochs: Arc<InvalidationEpochs>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache").finish_non_exhaustive()
    }
}

impl ResultCache {
    pub fn new(store: Arc<dyn TaggedStore>) -> Self {
        Self {
            store,
            epochs: Arc::new(InvalidationEpochs::new()),
        }
    }

    /// The underlying store, e.g. for a reaper task
    pub fn backend(&self) -> Arc<dyn TaggedStore> {
        Arc::clone(&self.store)
    }

    /// Live, unexpired payload at the key
    pub async fn lookup(&self, key: &CacheKey) -> QueryCacheResult<Option<Payload>> {
        self.store.get(key).await
    }

    /// Store a payload under its tags, overwriting any previous entry.
    ///
    /// A zero TTL stores nothing.
    pub async fn store(
        &self,
        key: CacheKey,
        payload: Payload,
        tags: TagSet,
        ttl: Duration,
    ) -> QueryCacheResult<StoreOutcome> {
        if ttl.is_zero() {
            return Ok(StoreOutcome::SkippedZeroTtl);
        }
        self.store.put(key, payload, tags, ttl).await?;
        Ok(StoreOutcome::Stored)
    }

    /// Capture the invalidation state of the given tags.
    ///
    /// Take the snapshot before executing the read whose result will be
    /// handed to [`store_guarded`](Self::store_guarded).
    pub fn snapshot(&self, tags: &TagSet) -> EpochSnapshot {
        self.epochs.snapshot(tags)
    }

    /// Whether nothing guarded by `snapshot` was invalidated since it was taken
    pub fn is_current(&self, snapshot: &EpochSnapshot) -> bool {
        self.epochs.unchanged_since(snapshot)
    }

    /// Store a result unless one of its tags was invalidated since `snapshot`.
    pub async fn store_guarded(
        &self,
        key: CacheKey,
        payload: Payload,
        tags: TagSet,
        ttl: Duration,
        snapshot: &EpochSnapshot,
    ) -> QueryCacheResult<StoreOutcome> {
        if ttl.is_zero() {
            return Ok(StoreOutcome::SkippedZeroTtl);
        }
        if !self.epochs.unchanged_since(snapshot) {
            debug!("Skipping store of {}: invalidated while executing", key);
            return Ok(StoreOutcome::SkippedStale);
        }

        self.store.put(key.clone(), payload, tags, ttl).await?;

        // An invalidation that overlapped the put may have missed the new entry.
        if !self.epochs.unchanged_since(snapshot) {
            debug!("Dropping {}: invalidated during store", key);
            self.store.delete(&key).await?;
            return Ok(StoreOutcome::SkippedStale);
        }
        Ok(StoreOutcome::Stored)
    }

    /// Flush every tag independently; returns the number of entries removed.
    ///
    /// Every tag is attempted even if an earlier one fails. Failures are
    /// reported together once all tags were tried.
    pub async fn invalidate(&self, tags: &TagSet) -> QueryCacheResult<usize> {
        let mut removed = 0;
        let mut failed: Vec<String> = Vec::new();

        for tag in tags {
            self.epochs.bump(tag);
            match self.store.flush_tag(tag).await {
                Ok(count) => {
                    debug!("Flushed tag {} ({} entries)", tag, count);
                    removed += count;
                }
                Err(err) => {
                    warn!("Failed to flush tag {}: {}", tag, err);
                    failed.push(tag.to_string());
                }
            }
        }

        if failed.is_empty() {
            Ok(removed)
        } else {
            Err(QueryCacheError::store_unavailable_with_context(
                format!("failed to flush {} of {} tag(s)", failed.len(), tags.len()),
                failed.join(", "),
            ))
        }
    }

    /// Flush the live column tags a scoped write may have made stale.
    ///
    /// Returns the tags that were flushed.
    pub async fn sweep(&self, sweep: &ColumnSweep) -> QueryCacheResult<TagSet> {
        let swept: TagSet = self
            .store
            .tags_with_prefix(&sweep.prefix())
            .await?
            .into_iter()
            .filter(|tag| sweep.covers(tag))
            .collect();

        if !swept.is_empty() {
            self.invalidate(&swept).await?;
        }
        Ok(swept)
    }

    /// Drop every entry
    pub async fn flush_all(&self) -> QueryCacheResult<()> {
        self.epochs.bump_all();
        self.store.flush_all().await
    }

    pub async fn contains(&self, key: &CacheKey) -> QueryCacheResult<bool> {
        self.store.has(key).await
    }

    pub async fn time_to_live(&self, key: &CacheKey) -> QueryCacheResult<Option<Duration>> {
        self.store.time_to_live(key).await
    }
}
