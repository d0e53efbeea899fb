//! Query cache configuration model

use crate::error::{QueryCacheError, QueryCacheResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Tables whose statements never touch the cache by default
pub const DEFAULT_EXCLUDED_TABLES: [&str; 5] = [
    "jobs",
    "failed_jobs",
    "cache",
    "sessions",
    "personal_access_tokens",
];

/// Whether reads are cached by default or only when marked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    /// Cache every eligible read unless it opts out
    All,
    /// Cache only reads that opt in
    #[default]
    Manual,
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for CacheStrategy {
    type Err = QueryCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "manual" => Ok(Self::Manual),
            other => Err(QueryCacheError::config(format!(
                "Unknown cache strategy '{}', expected 'all' or 'manual'",
                other
            ))),
        }
    }
}

/// Process-wide query cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryCacheConfig {
    /// Master switch
    pub enabled: bool,
    pub strategy: CacheStrategy,
    /// Default TTL in seconds
    pub duration: u64,
    /// Statements mentioning any of these tables bypass the cache
    pub excluded_tables: Vec<String>,
    /// Let equality-scoped writes flush only matching entries.
    /// When false every write flushes its whole table.
    pub scoped_invalidation: bool,
    /// Coalesce concurrent misses on the same key into one execution
    pub single_flight: bool,
    /// Seconds between expired-entry sweeps
    pub cleanup_interval: u64,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: CacheStrategy::Manual,
            duration: 3600,
            excluded_tables: DEFAULT_EXCLUDED_TABLES.iter().map(|t| t.to_string()).collect(),
            scoped_invalidation: true,
            single_flight: false,
            cleanup_interval: 300,
        }
    }
}

impl QueryCacheConfig {
    /// Default TTL
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.duration)
    }

    pub fn cleanup_every(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }

    /// Validate the configuration
    pub fn validate(&self) -> QueryCacheResult<()> {
        if let Some(index) = self.excluded_tables.iter().position(|t| t.trim().is_empty()) {
            return Err(QueryCacheError::config_with_context(
                "Excluded table names cannot be blank",
                format!("excluded_tables[{}]", index),
            ));
        }

        if self.cleanup_interval == 0 {
            return Err(QueryCacheError::config(
                "cleanup_interval must be greater than 0",
            ));
        }

        Ok(())
    }
}
