//! Cache entry types

use crate::tags::{Tag, TagSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opaque query result blob
pub type Payload = serde_json::Value;

/// A stored query result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cached result
    pub payload: Payload,
    /// Dependency tags
    pub tags: TagSet,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// When the entry stops being served
    pub expires_at: DateTime<Utc>,
    /// Approximate payload size in bytes
    pub size_bytes: usize,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(payload: Payload, tags: TagSet, ttl: Duration) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let size_bytes = payload.to_string().len();

        Self {
            payload,
            tags,
            created_at: now,
            expires_at,
            size_bytes,
        }
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Time until expiration, `None` once expired
    pub fn time_to_live(&self) -> Option<Duration> {
        (self.expires_at - Utc::now()).to_std().ok().filter(|d| !d.is_zero())
    }

    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }
}

/// Result of asking the cache to keep a freshly executed result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    /// TTL of zero means "do not cache"
    SkippedZeroTtl,
    /// An invalidation touched one of the entry's tags while it was computed
    SkippedStale,
}

impl StoreOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}
