//! Statement interception
//!
//! [`InterceptionCoordinator`] is handed every outgoing statement and walks it
//! through one of four terminal paths:
//!
//! - **hit**: a cacheable read found in the cache is answered without
//!   executing
//! - **miss**: a cacheable read is executed and its result stored under the
//!   read's tags
//! - **invalidate**: a write is executed and the tags it touches are flushed
//! - **bypass**: everything else is executed with the cache untouched
//!
//! Cache failures never reach the caller. They are logged and counted in
//! [`CacheStats`]; only the executor's own errors propagate.

mod executor;
mod outcome;
mod single_flight;

#[cfg(test)]
mod tests;

pub use executor::StatementExecutor;
pub use crate::policy::BypassReason;
pub use outcome::{Interception, Outcome};

use crate::cache::{
    CacheStats, EpochSnapshot, MemoryTaggedStore, ResultCache, StatsRecorder, TaggedStore,
};
use crate::config::QueryCacheConfig;
use crate::error::{QueryCacheError, QueryCacheResult, UnifiedError};
use crate::key::{CacheKey, KeyDeriver};
use crate::policy::{CachePolicy, Route};
use crate::statement::{InterceptedStatement, Statement};
use crate::tags::{StatementShape, Tag, TagExtractor, TagSet};
use futures::FutureExt;
use single_flight::{MissResult, SingleFlight};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A read miss waiting for its result to be stored
struct PendingStore {
    key: CacheKey,
    tags: TagSet,
    ttl: Duration,
    snapshot: EpochSnapshot,
}

/// Routes statements between the executor and the result cache
pub struct InterceptionCoordinator {
    policy: CachePolicy,
    keys: KeyDeriver,
    extractor: TagExtractor,
    cache: ResultCache,
    executor: Arc<dyn StatementExecutor>,
    stats: Arc<StatsRecorder>,
    single_flight: Option<SingleFlight>,
}

impl InterceptionCoordinator {
    /// Create a coordinator from a loaded configuration
    pub fn new(
        config: &QueryCacheConfig,
        store: Arc<dyn TaggedStore>,
        executor: Arc<dyn StatementExecutor>,
    ) -> Self {
        Self {
            policy: CachePolicy::new(config),
            keys: KeyDeriver::new(),
            extractor: TagExtractor::new(config.scoped_invalidation),
            cache: ResultCache::new(store),
            executor,
            stats: Arc::new(StatsRecorder::default()),
            single_flight: config.single_flight.then(SingleFlight::default),
        }
    }

    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Snapshot of the cache counters
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Drop every cached result
    pub async fn flush_all(&self) -> QueryCacheResult<()> {
        debug!("Flushing entire query cache");
        self.cache.flush_all().await
    }

    /// Process one statement and return its result.
    ///
    /// Errors are the executor's; cache trouble only changes the outcome.
    pub async fn intercept(&self, intercepted: &InterceptedStatement) -> QueryCacheResult<Interception> {
        let statement = &intercepted.statement;

        let ttl = match self.policy.route(statement, intercepted.directive.as_ref()) {
            Route::Read { ttl } => ttl,
            Route::Invalidate => return self.write_invalidate(statement).await,
            Route::Bypass(reason) => return self.bypass(statement, reason).await,
        };

        let key = match self.keys.derive(statement) {
            Ok(key) => key,
            Err(err) => {
                warn!("Not caching statement: {} ({})", err, statement.sql);
                return self.bypass(statement, BypassReason::FormatMismatch).await;
            }
        };

        match self.cache.lookup(&key).await {
            Ok(Some(payload)) => {
                debug!("Query cache hit: {}", key);
                self.stats.hit();
                return Ok(Interception {
                    payload,
                    outcome: Outcome::ReadHit,
                });
            }
            Ok(None) => debug!("Query cache miss: {}", key),
            Err(err) => {
                warn!("Cache lookup failed for {}, treating as miss: {}", key, err);
                self.stats.store_error();
            }
        }

        self.stats.miss();
        self.read_miss(statement, key, ttl).await
    }

    async fn read_miss(&self, statement: &Statement, key: CacheKey, ttl: Duration) -> QueryCacheResult<Interception> {
        let shape = self.analyze(statement);
        let tags = self.extractor.storage_tags(&shape);
        // Scoped writes to any table read here bump `scan:<t>`, so guard on it too.
        let snapshot = self.cache.snapshot(&self.extractor.guard_tags(&shape));
        let pending = PendingStore {
            snapshot,
            key,
            tags,
            ttl,
        };

        let (payload, stored) = match &self.single_flight {
            None => {
                execute_and_store(
                    self.executor.as_ref(),
                    &self.cache,
                    &self.stats,
                    statement,
                    pending,
                )
                .await?
            }
            Some(flight) => {
                let key = pending.key.clone();
                let snapshot = pending.snapshot.clone();
                let (shared, leader) = flight.join_or_start(&key, snapshot, |s| self.cache.is_current(s), || {
                    let executor = Arc::clone(&self.executor);
                    let cache = self.cache.clone();
                    let stats = Arc::clone(&self.stats);
                    let statement = statement.clone();
                    async move {
                        execute_and_store(executor.as_ref(), &cache, &stats, &statement, pending).await
                    }
                    .boxed()
                });
                if !leader {
                    debug!("Joined in-flight execution for {}", key);
                }
                shared.await?
            }
        };

        Ok(Interception {
            payload,
            outcome: Outcome::ReadMiss { stored },
        })
    }

    async fn write_invalidate(&self, statement: &Statement) -> QueryCacheResult<Interception> {
        let executed = self.executor.execute(statement).await;

        // A failed write may still have changed rows, so flush either way.
        let shape = self.analyze(statement);
        let mut flushed = self.extractor.invalidation_tags(&shape);

        match self.cache.invalidate(&flushed).await {
            Ok(removed) => debug!("Invalidated {} tag(s), {} entries", flushed.len(), removed),
            Err(err) => {
                warn!("Invalidation incomplete for `{}`: {}", statement.sql, err);
                self.stats.store_error();
            }
        }

        if let Some(sweep) = self.extractor.column_sweep(&shape) {
            match self.cache.sweep(&sweep).await {
                Ok(swept) => flushed.extend(swept),
                Err(err) => {
                    warn!("Column sweep failed for `{}`, flushing table: {}", statement.sql, err);
                    self.stats.store_error();
                    let table = TagSet::from([Tag::table(sweep.table())]);
                    if let Err(err) = self.cache.invalidate(&table).await {
                        warn!("Table flush failed for `{}`: {}", statement.sql, err);
                    }
                    flushed.extend(table);
                }
            }
        }
        self.stats.invalidated(flushed.len());

        Ok(Interception {
            payload: executed?,
            outcome: Outcome::WriteInvalidate { flushed },
        })
    }

    fn analyze(&self, statement: &Statement) -> StatementShape {
        let shape = self.extractor.analyze(&statement.sql, &statement.bindings, statement.kind);
        if let Some(err) = shape.degradation(&statement.sql) {
            warn!(
                code = err.error_code(),
                "Degraded tag extraction ({}): {}",
                err.message(),
                err.context().unwrap_or_default()
            );
            self.stats.degraded();
        }
        shape
    }

    async fn bypass(&self, statement: &Statement, reason: BypassReason) -> QueryCacheResult<Interception> {
        debug!("Bypassing query cache ({}): {}", reason, statement.sql);
        self.stats.bypass();
        let payload = self.executor.execute(statement).await?;
        Ok(Interception {
            payload,
            outcome: Outcome::Bypass(reason),
        })
    }
}

/// Execute a missed read and store the result if nothing invalidated it meanwhile
async fn execute_and_store(
    executor: &dyn StatementExecutor,
    cache: &ResultCache,
    stats: &StatsRecorder,
    statement: &Statement,
    pending: PendingStore,
) -> MissResult {
    let payload = executor.execute(statement).await?;

    let PendingStore {
        key,
        tags,
        ttl,
        snapshot,
    } = pending;

    let stored = match cache
        .store_guarded(key.clone(), payload.clone(), tags, ttl, &snapshot)
        .await
    {
        Ok(outcome) => {
            if !outcome.is_stored() {
                debug!("Result for {} not stored: {:?}", key, outcome);
            }
            outcome.is_stored()
        }
        Err(err) => {
            warn!("Failed to store result for {}: {}", key, err);
            stats.store_error();
            false
        }
    };
    stats.stored(stored);

    Ok((payload, stored))
}

/// Builder for [`InterceptionCoordinator`]
#[derive(Default)]
pub struct CoordinatorBuilder {
    config: Option<QueryCacheConfig>,
    store: Option<Arc<dyn TaggedStore>>,
    executor: Option<Arc<dyn StatementExecutor>>,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: QueryCacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a specific store; defaults to a fresh [`MemoryTaggedStore`]
    pub fn with_store(mut self, store: Arc<dyn TaggedStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn StatementExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> QueryCacheResult<InterceptionCoordinator> {
        let executor = self.executor.ok_or_else(|| {
            QueryCacheError::invalid_input_field("A statement executor is required", "executor")
        })?;
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryTaggedStore::new()) as Arc<dyn TaggedStore>);

        Ok(InterceptionCoordinator::new(&config, store, executor))
    }
}
