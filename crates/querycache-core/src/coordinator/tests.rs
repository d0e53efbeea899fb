//! Coordinator tests

use super::*;
use crate::cache::Payload;
use crate::config::CacheStrategy;
use crate::statement::{BoundValue, StatementKind};
use crate::tags::Tag;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Executor that counts calls and answers with the call number
#[derive(Default)]
struct CountingExecutor {
    calls: AtomicUsize,
}

impl CountingExecutor {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatementExecutor for CountingExecutor {
    async fn execute(&self, statement: &Statement) -> QueryCacheResult<Payload> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "sql": statement.sql, "call": call }))
    }
}

/// Executor whose every statement fails
struct FailingExecutor;

#[async_trait]
impl StatementExecutor for FailingExecutor {
    async fn execute(&self, _statement: &Statement) -> QueryCacheResult<Payload> {
        Err(QueryCacheError::execution("deadlock detected"))
    }
}

/// Executor over a single user's name; the first read can be held open
struct GatedExecutor {
    name: Mutex<String>,
    hold_next_read: AtomicBool,
    started: Notify,
    release: Notify,
}

impl GatedExecutor {
    fn new(name: &str) -> Self {
        Self {
            name: Mutex::new(name.to_string()),
            hold_next_read: AtomicBool::new(true),
            started: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl StatementExecutor for GatedExecutor {
    async fn execute(&self, statement: &Statement) -> QueryCacheResult<Payload> {
        if statement.kind == StatementKind::Write {
            if let Some(BoundValue::Text(name)) = statement.bindings.first() {
                *self.name.lock().unwrap() = name.clone();
            }
            return Ok(json!({ "affected": 1 }));
        }

        let seen = self.name.lock().unwrap().clone();
        if self.hold_next_read.swap(false, Ordering::SeqCst) {
            self.started.notify_one();
            self.release.notified().await;
        }
        Ok(json!(seen))
    }
}

/// Memory store that cannot list its tags
struct NoListingStore(MemoryTaggedStore);

#[async_trait]
impl TaggedStore for NoListingStore {
    async fn get(&self, key: &CacheKey) -> QueryCacheResult<Option<Payload>> {
        self.0.get(key).await
    }

    async fn put(&self, key: CacheKey, payload: Payload, tags: TagSet, ttl: Duration) -> QueryCacheResult<()> {
        self.0.put(key, payload, tags, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> QueryCacheResult<()> {
        self.0.delete(key).await
    }

    async fn has(&self, key: &CacheKey) -> QueryCacheResult<bool> {
        self.0.has(key).await
    }

    async fn time_to_live(&self, key: &CacheKey) -> QueryCacheResult<Option<Duration>> {
        self.0.time_to_live(key).await
    }

    async fn flush_tag(&self, tag: &Tag) -> QueryCacheResult<usize> {
        self.0.flush_tag(tag).await
    }

    async fn flush_all(&self) -> QueryCacheResult<()> {
        self.0.flush_all().await
    }

    async fn cleanup_expired(&self) -> QueryCacheResult<usize> {
        self.0.cleanup_expired().await
    }

    async fn tags_with_prefix(&self, _prefix: &str) -> QueryCacheResult<Vec<Tag>> {
        Err(QueryCacheError::store_unavailable("SCAN not permitted"))
    }

    async fn len(&self) -> QueryCacheResult<usize> {
        self.0.len().await
    }
}

/// Store that is never reachable
struct UnreachableStore;

#[async_trait]
impl TaggedStore for UnreachableStore {
    async fn get(&self, _key: &CacheKey) -> QueryCacheResult<Option<Payload>> {
        Err(QueryCacheError::store_unavailable("connection refused"))
    }

    async fn put(&self, _key: CacheKey, _payload: Payload, _tags: TagSet, _ttl: Duration) -> QueryCacheResult<()> {
        Err(QueryCacheError::store_unavailable("connection refused"))
    }

    async fn delete(&self, _key: &CacheKey) -> QueryCacheResult<()> {
        Err(QueryCacheError::store_unavailable("connection refused"))
    }

    async fn has(&self, _key: &CacheKey) -> QueryCacheResult<bool> {
        Err(QueryCacheError::store_unavailable("connection refused"))
    }

    async fn time_to_live(&self, _key: &CacheKey) -> QueryCacheResult<Option<Duration>> {
        Err(QueryCacheError::store_unavailable("connection refused"))
    }

    async fn flush_tag(&self, _tag: &Tag) -> QueryCacheResult<usize> {
        Err(QueryCacheError::store_unavailable("connection refused"))
    }

    async fn flush_all(&self) -> QueryCacheResult<()> {
        Err(QueryCacheError::store_unavailable("connection refused"))
    }

    async fn cleanup_expired(&self) -> QueryCacheResult<usize> {
        Err(QueryCacheError::store_unavailable("connection refused"))
    }

    async fn tags_with_prefix(&self, _prefix: &str) -> QueryCacheResult<Vec<Tag>> {
        Err(QueryCacheError::store_unavailable("connection refused"))
    }

    async fn len(&self) -> QueryCacheResult<usize> {
        Err(QueryCacheError::store_unavailable("connection refused"))
    }
}

fn coordinator(config: QueryCacheConfig) -> (InterceptionCoordinator, Arc<CountingExecutor>) {
    let executor = Arc::new(CountingExecutor::default());
    let coordinator = InterceptionCoordinator::new(
        &config,
        Arc::new(MemoryTaggedStore::new()),
        Arc::clone(&executor) as Arc<dyn StatementExecutor>,
    );
    (coordinator, executor)
}

fn active_users(active: bool) -> Statement {
    Statement::new(
        "select * from users where active = ?",
        vec![BoundValue::Bool(active)],
    )
}

#[tokio::test]
async fn test_read_through_executes_once() {
    let (coordinator, executor) = coordinator(QueryCacheConfig::default());

    let first = coordinator.intercept(&active_users(true).cache()).await.unwrap();
    let second = coordinator.intercept(&active_users(true).cache()).await.unwrap();

    assert_eq!(first.outcome, Outcome::ReadMiss { stored: true });
    assert_eq!(second.outcome, Outcome::ReadHit);
    assert_eq!(second.payload, first.payload);
    assert_eq!(executor.calls(), 1);

    let key = CacheKey::for_materialized("select * from users where active = '1'");
    assert!(coordinator.cache().contains(&key).await.unwrap());
}

#[tokio::test]
async fn test_scoped_update_keeps_other_predicate() {
    let (coordinator, executor) = coordinator(QueryCacheConfig::default());
    coordinator.intercept(&active_users(true).cache()).await.unwrap();
    coordinator.intercept(&active_users(false).cache()).await.unwrap();

    let update = Statement::new(
        "UPDATE users SET name = ? WHERE active = ?",
        vec![BoundValue::Text("John".into()), BoundValue::Int(1)],
    );
    let result = coordinator.intercept(&update.intercept()).await.unwrap();
    assert!(matches!(result.outcome, Outcome::WriteInvalidate { .. }));

    let inactive = coordinator.intercept(&active_users(false).cache()).await.unwrap();
    assert_eq!(inactive.outcome, Outcome::ReadHit);

    let active = coordinator.intercept(&active_users(true).cache()).await.unwrap();
    assert_eq!(active.outcome, Outcome::ReadMiss { stored: true });

    // Two initial misses, the update and the refreshed active=1 read.
    assert_eq!(executor.calls(), 4);
}

fn user_name(id: i64) -> Statement {
    Statement::new("select name from users where id = ?", vec![BoundValue::Int(id)])
}

fn rename_where_active(name: &str) -> Statement {
    Statement::new(
        "update users set name = ? where active = ?",
        vec![BoundValue::Text(name.into()), BoundValue::Int(1)],
    )
}

#[tokio::test]
async fn test_write_filtered_on_other_column_evicts_scoped_reads() {
    let (coordinator, executor) = coordinator(QueryCacheConfig::default());
    coordinator.intercept(&user_name(5).cache()).await.unwrap();
    coordinator.intercept(&active_users(false).cache()).await.unwrap();

    // Row 5 may be active, so its cached name is stale after this.
    let result = coordinator.intercept(&rename_where_active("zed").intercept()).await.unwrap();
    let Outcome::WriteInvalidate { flushed } = result.outcome else {
        panic!("expected a write, got {:?}", result.outcome);
    };
    assert!(flushed.contains(&Tag::column("users", "id")));
    assert!(!flushed.contains(&Tag::column("users", "active")));

    let reread = coordinator.intercept(&user_name(5).cache()).await.unwrap();
    assert_eq!(reread.outcome, Outcome::ReadMiss { stored: true });

    // Filtered on the write's own column with another value: untouched.
    let inactive = coordinator.intercept(&active_users(false).cache()).await.unwrap();
    assert_eq!(inactive.outcome, Outcome::ReadHit);
    assert_eq!(executor.calls(), 4);
}

#[tokio::test]
async fn test_failed_column_sweep_flushes_table() {
    let executor = Arc::new(CountingExecutor::default());
    let coordinator = InterceptionCoordinator::new(
        &QueryCacheConfig::default(),
        Arc::new(NoListingStore(MemoryTaggedStore::new())),
        Arc::clone(&executor) as Arc<dyn StatementExecutor>,
    );
    coordinator.intercept(&user_name(5).cache()).await.unwrap();

    let result = coordinator.intercept(&rename_where_active("zed").intercept()).await.unwrap();
    let Outcome::WriteInvalidate { flushed } = result.outcome else {
        panic!("expected a write, got {:?}", result.outcome);
    };
    assert!(flushed.contains(&Tag::table("users")));

    let reread = coordinator.intercept(&user_name(5).cache()).await.unwrap();
    assert!(!reread.outcome.is_hit());
    assert_eq!(coordinator.stats().store_errors, 1);
}

#[tokio::test]
async fn test_commented_write_still_invalidates() {
    let (coordinator, _) = coordinator(QueryCacheConfig::default());

    for sql in [
        "/* controller=users,action=update */ UPDATE users SET name = ? WHERE active = ?",
        "-- rename\nupdate users set name = ? where active = ?",
    ] {
        coordinator.intercept(&active_users(true).cache()).await.unwrap();

        let write = Statement::new(sql, vec![BoundValue::Text("John".into()), BoundValue::Int(1)]);
        let result = coordinator.intercept(&write.intercept()).await.unwrap();
        assert!(matches!(result.outcome, Outcome::WriteInvalidate { .. }), "{}", sql);

        let again = coordinator.intercept(&active_users(true).cache()).await.unwrap();
        assert_eq!(again.outcome, Outcome::ReadMiss { stored: true }, "{}", sql);
    }
}

#[tokio::test]
async fn test_read_started_before_write_is_not_joined() {
    let executor = Arc::new(GatedExecutor::new("ann"));
    let config = QueryCacheConfig {
        single_flight: true,
        ..Default::default()
    };
    let coordinator = InterceptionCoordinator::new(
        &config,
        Arc::new(MemoryTaggedStore::new()),
        Arc::clone(&executor) as Arc<dyn StatementExecutor>,
    );
    let rename = Statement::new(
        "update users set name = ? where id = ?",
        vec![BoundValue::Text("zed".into()), BoundValue::Int(5)],
    );

    let early_read = user_name(5).cache();
    let early = coordinator.intercept(&early_read);
    let late = async {
        executor.started.notified().await;
        coordinator.intercept(&rename.intercept()).await.unwrap();
        let late = coordinator.intercept(&user_name(5).cache()).await.unwrap();
        executor.release.notify_one();
        late
    };
    let (early, late) = tokio::join!(early, late);
    let early = early.unwrap();

    assert_eq!(late.payload, json!("zed"));
    assert_eq!(late.outcome, Outcome::ReadMiss { stored: true });
    assert_eq!(early.payload, json!("ann"));
    assert_eq!(early.outcome, Outcome::ReadMiss { stored: false });

    let cached = coordinator.intercept(&user_name(5).cache()).await.unwrap();
    assert_eq!(cached.outcome, Outcome::ReadHit);
    assert_eq!(cached.payload, json!("zed"));
}

#[tokio::test]
async fn test_excluded_tables_never_cached() {
    let config = QueryCacheConfig {
        strategy: CacheStrategy::All,
        ..Default::default()
    };
    let (coordinator, executor) = coordinator(config);
    let jobs = Statement::new("select * from jobs where queue = ?", vec![BoundValue::Text("default".into())]);

    for _ in 0..2 {
        let result = coordinator.intercept(&jobs.clone().cache()).await.unwrap();
        assert_eq!(result.outcome, Outcome::Bypass(BypassReason::Excluded("jobs".into())));
    }
    assert_eq!(executor.calls(), 2);

    let key = KeyDeriver::new().derive(&jobs).unwrap();
    assert!(!coordinator.cache().contains(&key).await.unwrap());
}

#[tokio::test]
async fn test_manual_strategy_needs_marker() {
    let (coordinator, executor) = coordinator(QueryCacheConfig::default());
    let statement = active_users(true);
    let key = KeyDeriver::new().derive(&statement).unwrap();

    let unmarked = coordinator.intercept(&statement.clone().intercept()).await.unwrap();
    assert_eq!(unmarked.outcome, Outcome::Bypass(BypassReason::NotSelected));
    assert!(!coordinator.cache().contains(&key).await.unwrap());

    coordinator.intercept(&statement.cache()).await.unwrap();
    assert!(coordinator.cache().contains(&key).await.unwrap());
    assert_eq!(executor.calls(), 2);
}

#[tokio::test]
async fn test_all_strategy_respects_opt_out() {
    let config = QueryCacheConfig {
        strategy: CacheStrategy::All,
        ..Default::default()
    };
    let (coordinator, _) = coordinator(config);

    let cached = coordinator.intercept(&active_users(true).intercept()).await.unwrap();
    assert_eq!(cached.outcome, Outcome::ReadMiss { stored: true });

    let opted_out = coordinator.intercept(&active_users(true).no_cache()).await.unwrap();
    assert_eq!(opted_out.outcome, Outcome::Bypass(BypassReason::NotSelected));
}

#[tokio::test]
async fn test_directive_ttl_is_applied() {
    let (coordinator, _) = coordinator(QueryCacheConfig::default());
    let statement = active_users(true);
    let key = KeyDeriver::new().derive(&statement).unwrap();

    coordinator
        .intercept(&statement.cache_for(Duration::from_secs(60)))
        .await
        .unwrap();

    let ttl = coordinator.cache().time_to_live(&key).await.unwrap().unwrap().as_secs();
    assert!((55..=65).contains(&ttl), "ttl was {}", ttl);
}

#[tokio::test]
async fn test_zero_ttl_bypasses() {
    let (coordinator, executor) = coordinator(QueryCacheConfig::default());
    let result = coordinator
        .intercept(&active_users(true).cache_for(Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(result.outcome, Outcome::Bypass(BypassReason::ZeroTtl));

    coordinator.intercept(&active_users(true).cache_for(Duration::ZERO)).await.unwrap();
    assert_eq!(executor.calls(), 2);
}

#[tokio::test]
async fn test_imprecise_read_still_invalidated_by_table_write() {
    let (coordinator, executor) = coordinator(QueryCacheConfig::default());
    let odd = Statement::new(
        "select * from users where lower(email) = ? and id in (select user_id from bans)",
        vec![BoundValue::Text("a@b.c".into())],
    );

    coordinator.intercept(&odd.clone().cache()).await.unwrap();
    assert!(coordinator.intercept(&odd.clone().cache()).await.unwrap().outcome.is_hit());

    let insert = Statement::new("insert into users (email) values (?)", vec![BoundValue::Text("x@y.z".into())]);
    coordinator.intercept(&insert.intercept()).await.unwrap();

    let after = coordinator.intercept(&odd.cache()).await.unwrap();
    assert_eq!(after.outcome, Outcome::ReadMiss { stored: true });
    assert_eq!(executor.calls(), 3);
}

#[tokio::test]
async fn test_unmarked_write_invalidates_under_manual_strategy() {
    let (coordinator, _) = coordinator(QueryCacheConfig::default());
    coordinator.intercept(&active_users(true).cache()).await.unwrap();

    let delete = Statement::new("delete from users", vec![]);
    let result = coordinator.intercept(&delete.intercept()).await.unwrap();
    assert_eq!(
        result.outcome,
        Outcome::WriteInvalidate {
            flushed: TagSet::from([Tag::table("users")])
        }
    );

    let again = coordinator.intercept(&active_users(true).cache()).await.unwrap();
    assert!(!again.outcome.is_hit());
}

#[tokio::test]
async fn test_disabled_cache_bypasses_everything() {
    let config = QueryCacheConfig {
        enabled: false,
        strategy: CacheStrategy::All,
        ..Default::default()
    };
    let (coordinator, executor) = coordinator(config);

    for _ in 0..2 {
        let result = coordinator.intercept(&active_users(true).cache()).await.unwrap();
        assert_eq!(result.outcome, Outcome::Bypass(BypassReason::Disabled));
    }
    assert_eq!(executor.calls(), 2);
}

#[tokio::test]
async fn test_format_mismatch_bypasses() {
    let (coordinator, executor) = coordinator(QueryCacheConfig::default());
    let broken = Statement::new("select * from users where id = ? and team = ?", vec![BoundValue::Int(1)]);

    let result = coordinator.intercept(&broken.cache()).await.unwrap();
    assert_eq!(result.outcome, Outcome::Bypass(BypassReason::FormatMismatch));
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_other_statements_bypass() {
    let (coordinator, _) = coordinator(QueryCacheConfig::default());
    let result = coordinator
        .intercept(&Statement::new("BEGIN", vec![]).cache())
        .await
        .unwrap();
    assert_eq!(result.outcome, Outcome::Bypass(BypassReason::NotCacheableKind));
}

#[tokio::test]
async fn test_store_outage_is_absorbed() {
    let executor = Arc::new(CountingExecutor::default());
    let coordinator = InterceptionCoordinator::new(
        &QueryCacheConfig::default(),
        Arc::new(UnreachableStore),
        Arc::clone(&executor) as Arc<dyn StatementExecutor>,
    );

    let read = coordinator.intercept(&active_users(true).cache()).await.unwrap();
    assert_eq!(read.outcome, Outcome::ReadMiss { stored: false });

    let write = Statement::new("update users set name = 'x' where id = 1", vec![]);
    let result = coordinator.intercept(&write.intercept()).await.unwrap();
    assert!(matches!(result.outcome, Outcome::WriteInvalidate { .. }));

    assert_eq!(executor.calls(), 2);
    let stats = coordinator.stats();
    // Failed lookup, failed store, failed invalidation, failed column sweep.
    assert_eq!(stats.store_errors, 4);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_execution_errors_propagate() {
    let coordinator = InterceptionCoordinator::new(
        &QueryCacheConfig::default(),
        Arc::new(MemoryTaggedStore::new()),
        Arc::new(FailingExecutor),
    );

    let err = coordinator.intercept(&active_users(true).cache()).await.unwrap_err();
    assert!(matches!(err, QueryCacheError::Execution { .. }));

    let write = Statement::new("delete from users where id = 1", vec![]);
    assert!(coordinator.intercept(&write.intercept()).await.is_err());
}

#[tokio::test]
async fn test_flush_all_and_stats() {
    let (coordinator, _) = coordinator(QueryCacheConfig::default());
    coordinator.intercept(&active_users(true).cache()).await.unwrap();
    coordinator.intercept(&active_users(true).cache()).await.unwrap();
    coordinator.flush_all().await.unwrap();
    coordinator.intercept(&active_users(true).cache()).await.unwrap();

    let stats = coordinator.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.stores, 2);
}

#[test]
fn test_builder_requires_executor() {
    let err = InterceptionCoordinator::builder().build().err().unwrap();
    assert!(matches!(err, QueryCacheError::InvalidInput { .. }));

    let built = InterceptionCoordinator::builder()
        .with_config(QueryCacheConfig::default())
        .with_executor(Arc::new(CountingExecutor::default()))
        .build();
    assert!(built.is_ok());
}
