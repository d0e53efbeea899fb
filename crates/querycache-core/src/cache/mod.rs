//! Result caching
//!
//! - [`TaggedStore`]: the tagged key/value store capability, with an
//!   in-memory implementation in [`MemoryTaggedStore`]
//! - [`ResultCache`]: lookup, store and tag invalidation on top of a store
//! - [`spawn_reaper`]: background removal of expired entries

pub mod reaper;
pub mod result_cache;
pub mod stats;
pub mod storage;
pub mod types;


pub use reaper::spawn_reaper;
pub use result_cache::{EpochSnapshot, ResultCache};
pub use stats::CacheStats;
pub(crate) use stats::StatsRecorder;
pub use storage::{MemoryTaggedStore, TaggedStore};
pub use types::{CacheEntry, Payload, StoreOutcome};
