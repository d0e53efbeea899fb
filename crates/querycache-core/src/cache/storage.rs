//! Tagged key/value store interface and the in-memory implementation

use super::types::{CacheEntry, Payload};
use crate::error::QueryCacheResult;
use crate::key::CacheKey;
use crate::tags::{Tag, TagSet};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::time::Duration;

/// Tagged cache store capability
///
/// Implementations guarantee that `put` is atomic per key, that `flush_tag`
/// is atomic for the entries of that tag, and that `get` never observes a
/// partially written entry.
#[async_trait]
pub trait TaggedStore: Send + Sync {
    /// Get a live payload
    async fn get(&self, key: &CacheKey) -> QueryCacheResult<Option<Payload>>;

    /// Store a payload, replacing any entry at the key
    async fn put(&self, key: CacheKey, payload: Payload, tags: TagSet, ttl: Duration) -> QueryCacheResult<()>;

    /// Remove a single entry
    async fn delete(&self, key: &CacheKey) -> QueryCacheResult<()>;

    /// Whether a live entry exists at the key
    async fn has(&self, key: &CacheKey) -> QueryCacheResult<bool>;

    /// Remaining lifetime of a live entry
    async fn time_to_live(&self, key: &CacheKey) -> QueryCacheResult<Option<Duration>>;

    /// Drop every entry carrying the tag; returns how many were removed
    async fn flush_tag(&self, tag: &Tag) -> QueryCacheResult<usize>;

    /// Drop every entry
    async fn flush_all(&self) -> QueryCacheResult<()>;

    /// Reclaim expired entries; returns how many were removed
    async fn cleanup_expired(&self) -> QueryCacheResult<usize>;

    /// Tags starting with `prefix` that currently label at least one entry
    async fn tags_with_prefix(&self, prefix: &str) -> QueryCacheResult<Vec<Tag>>;

    /// Number of stored entries, live or not yet reclaimed
    async fn len(&self) -> QueryCacheResult<usize>;
}

/// In-memory tagged store
///
/// Sharded maps keep unrelated keys and tags from contending. The tag index
/// decides liveness: an entry is served only while every one of its tags
/// still indexes its key, so flushing a tag kills its entries at once, even
/// one whose put raced the flush. The index only holds tags that currently
/// label at least one key.
#[derive(Debug, Default)]
pub struct MemoryTaggedStore {
    entries: DashMap<CacheKey, CacheEntry>,
    tag_index: DashMap<Tag, HashSet<CacheKey>>,
}

impl MemoryTaggedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tags currently labelling at least one key
    pub fn indexed_tags(&self) -> usize {
        self.tag_index.len()
    }

    fn is_indexed(&self, tag: &Tag, key: &CacheKey) -> bool {
        self.tag_index.get(tag).is_some_and(|keys| keys.contains(key))
    }

    fn is_live(&self, key: &CacheKey, entry: &CacheEntry) -> bool {
        !entry.is_expired() && entry.tags.iter().all(|tag| self.is_indexed(tag, key))
    }

    /// Read a live entry, dropping it when it turns out to be dead.
    fn live_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let found = self
            .entries
            .get(key)
            .map(|entry| (self.is_live(key, &entry), entry.clone()));

        match found {
            Some((true, entry)) => Some(entry),
            Some((false, _)) => {
                if let Some((_, dead)) = self.entries.remove_if(key, |k, entry| !self.is_live(k, entry)) {
                    self.unindex(key, dead.tags.into_iter());
                }
                None
            }
            None => None,
        }
    }

    fn unindex(&self, key: &CacheKey, tags: impl Iterator<Item = Tag>) {
        for tag in tags {
            let emptied = self
                .tag_index
                .get_mut(&tag)
                .map(|mut keys| {
                    keys.remove(key);
                    keys.is_empty()
                })
                .unwrap_or(false);
            if emptied {
                self.tag_index.remove_if(&tag, |_, keys| keys.is_empty());
            }
        }
    }
}

#[async_trait]
impl TaggedStore for MemoryTaggedStore {
    async fn get(&self, key: &CacheKey) -> QueryCacheResult<Option<Payload>> {
        Ok(self.live_entry(key).map(|entry| entry.payload))
    }

    async fn put(&self, key: CacheKey, payload: Payload, tags: TagSet, ttl: Duration) -> QueryCacheResult<()> {
        // Index before inserting, so a flush landing in between leaves the
        // entry dead instead of live and unindexed.
        for tag in &tags {
            self.tag_index.entry(tag.clone()).or_default().insert(key.clone());
        }

        let entry = CacheEntry::new(payload, tags, ttl);
        let new_tags = entry.tags.clone();

        if let Some(previous) = self.entries.insert(key.clone(), entry) {
            let dropped = previous.tags.into_iter().filter(|t| !new_tags.contains(t));
            self.unindex(&key, dropped);
        }
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> QueryCacheResult<()> {
        if let Some((_, entry)) = self.entries.remove(key) {
            self.unindex(key, entry.tags.into_iter());
        }
        Ok(())
    }

    async fn has(&self, key: &CacheKey) -> QueryCacheResult<bool> {
        Ok(self.live_entry(key).is_some())
    }

    async fn time_to_live(&self, key: &CacheKey) -> QueryCacheResult<Option<Duration>> {
        Ok(self.live_entry(key).and_then(|entry| entry.time_to_live()))
    }

    async fn flush_tag(&self, tag: &Tag) -> QueryCacheResult<usize> {
        // Removing the index set is the flush; the entries below are reclaimed eagerly.
        let Some((_, keys)) = self.tag_index.remove(tag) else {
            return Ok(0);
        };

        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove_if(&key, |_, entry| entry.has_tag(tag)) {
                removed += 1;
                self.unindex(&key, entry.tags.into_iter().filter(|t| t != tag));
            }
        }
        Ok(removed)
    }

    async fn flush_all(&self) -> QueryCacheResult<()> {
        self.tag_index.clear();
        self.entries.clear();
        Ok(())
    }

    async fn cleanup_expired(&self) -> QueryCacheResult<usize> {
        let dead: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|item| !self.is_live(item.key(), item.value()))
            .map(|item| item.key().clone())
            .collect();

        let mut removed = 0;
        for key in dead {
            if let Some((_, entry)) = self.entries.remove_if(&key, |k, entry| !self.is_live(k, entry)) {
                removed += 1;
                self.unindex(&key, entry.tags.into_iter());
            }
        }
        Ok(removed)
    }

    async fn tags_with_prefix(&self, prefix: &str) -> QueryCacheResult<Vec<Tag>> {
        Ok(self
            .tag_index
            .iter()
            .filter(|item| item.key().as_str().starts_with(prefix))
            .map(|item| item.key().clone())
            .collect())
    }

    async fn len(&self) -> QueryCacheResult<usize> {
        Ok(self.entries.len())
    }
}
