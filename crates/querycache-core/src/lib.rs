//! QueryCache Core Library
//!
//! Read-through caching of SQL query results with tag-scoped invalidation.
//! Reads are stored under a key derived from the fully bound statement and
//! labelled with the tables and equality predicates they depend on; writes
//! flush exactly the labels they may have made stale.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod key;
pub mod policy;
pub mod statement;
pub mod tags;

// Re-export commonly used types
pub use cache::{
    CacheEntry, CacheStats, MemoryTaggedStore, Payload, ResultCache, StoreOutcome, TaggedStore,
    spawn_reaper,
};
pub use config::{CacheStrategy, ConfigLoader, QueryCacheConfig, load_config};
pub use coordinator::{
    BypassReason, CoordinatorBuilder, Interception, InterceptionCoordinator, Outcome,
    StatementExecutor,
};
pub use error::{QueryCacheError, QueryCacheResult, ResultExt, UnifiedError};
pub use key::{CacheKey, KeyDeriver};
pub use policy::{CachePolicy, Route};
pub use statement::{BoundValue, CacheDirective, InterceptedStatement, Statement, StatementKind};
pub use tags::{ColumnSweep, StatementShape, Tag, TagExtractor, TagSet};
