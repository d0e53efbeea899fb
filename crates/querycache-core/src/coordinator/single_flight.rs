//! Coalescing of concurrent cache misses

use crate::cache::{EpochSnapshot, Payload};
use crate::error::{QueryCacheError, QueryCacheResult};
use crate::key::CacheKey;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Payload and whether it was stored
pub(crate) type MissResult = QueryCacheResult<(Payload, bool)>;

type SharedMiss = Shared<BoxFuture<'static, MissResult>>;

/// A running execution and the invalidation state it started from
struct InFlight {
    id: u64,
    snapshot: EpochSnapshot,
    shared: SharedMiss,
}

/// In-flight executions keyed by cache key
///
/// The execution runs on its own task, so it completes and leaves the map
/// even if every caller waiting on it is cancelled.
#[derive(Default)]
pub(crate) struct SingleFlight {
    calls: Arc<DashMap<CacheKey, InFlight>>,
    next_id: AtomicU64,
}

impl SingleFlight {
    /// Join the execution running for `key`, or start `work` as the leader.
    ///
    /// A running execution is joined only while `still_valid` accepts the
    /// snapshot it started from. Otherwise `work` starts fresh from
    /// `snapshot` and takes over the slot; the superseded execution still
    /// completes for the callers already waiting on it.
    ///
    /// Returns the shared result future and whether this caller started it.
    pub(crate) fn join_or_start<F, V>(
        &self,
        key: &CacheKey,
        snapshot: EpochSnapshot,
        still_valid: V,
        work: F,
    ) -> (SharedMiss, bool)
    where
        F: FnOnce() -> BoxFuture<'static, MissResult>,
        V: Fn(&EpochSnapshot) -> bool,
    {
        // The spawned task's removal waits on the shard lock held by the entry.
        match self.calls.entry(key.clone()) {
            Entry::Occupied(running) if still_valid(&running.get().snapshot) => {
                (running.get().shared.clone(), false)
            }
            Entry::Occupied(mut stale) => {
                let call = self.start(key, snapshot, work);
                let shared = call.shared.clone();
                stale.insert(call);
                (shared, true)
            }
            Entry::Vacant(slot) => {
                let call = self.start(key, snapshot, work);
                let shared = call.shared.clone();
                slot.insert(call);
                (shared, true)
            }
        }
    }

    fn start<F>(&self, key: &CacheKey, snapshot: EpochSnapshot, work: F) -> InFlight
    where
        F: FnOnce() -> BoxFuture<'static, MissResult>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let calls = Arc::clone(&self.calls);
        let owned_key = key.clone();
        let task = work();
        let handle = tokio::spawn(async move {
            let result = task.await;
            calls.remove_if(&owned_key, |_, call| call.id == id);
            result
        });

        let shared = async move {
            handle.await.unwrap_or_else(|e| {
                Err(QueryCacheError::execution(format!(
                    "Coalesced execution did not complete: {}",
                    e
                )))
            })
        }
        .boxed()
        .shared();

        InFlight {
            id,
            snapshot,
            shared,
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.calls.len()
    }
}
