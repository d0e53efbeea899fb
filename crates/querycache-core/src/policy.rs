//! Cache eligibility rules

use crate::config::{CacheStrategy, QueryCacheConfig};
use crate::statement::{CacheDirective, Statement, StatementKind};
use std::fmt;
use std::time::Duration;

/// Why a statement goes straight to the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassReason {
    /// Caching is switched off
    Disabled,
    /// The statement mentions an excluded table
    Excluded(String),
    /// The strategy and directive did not select the read
    NotSelected,
    /// Placeholder and bound value counts disagree
    FormatMismatch,
    /// The effective TTL is zero
    ZeroTtl,
    /// Neither a read nor a write
    NotCacheableKind,
}

impl fmt::Display for BypassReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "caching disabled"),
            Self::Excluded(table) => write!(f, "excluded table '{}'", table),
            Self::NotSelected => write!(f, "not selected by strategy"),
            Self::FormatMismatch => write!(f, "placeholder/binding mismatch"),
            Self::ZeroTtl => write!(f, "zero ttl"),
            Self::NotCacheableKind => write!(f, "not a read or write"),
        }
    }
}

/// Path a statement takes through the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Serve from the cache or store with this TTL
    Read { ttl: Duration },
    /// Execute, then flush the tags the write touches
    Invalidate,
    Bypass(BypassReason),
}

/// Decides which statements may use the cache and for how long
#[derive(Debug, Clone)]
pub struct CachePolicy {
    enabled: bool,
    strategy: CacheStrategy,
    default_ttl: Duration,
    /// Lowercased excluded table names
    excluded: Vec<String>,
}

impl CachePolicy {
    pub fn new(config: &QueryCacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            strategy: config.strategy,
            default_ttl: config.default_ttl(),
            excluded: config
                .excluded_tables
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a read may be served from and stored in the cache.
    ///
    /// Disabled caching wins over any directive. Under `All` a read is
    /// cacheable unless it opts out; under `Manual` only if it opts in.
    pub fn is_cacheable(&self, statement: &Statement, directive: Option<&CacheDirective>) -> bool {
        if !self.enabled || statement.kind != StatementKind::Read {
            return false;
        }

        match self.strategy {
            CacheStrategy::All => directive.is_none_or(|d| d.enabled),
            CacheStrategy::Manual => directive.is_some_and(|d| d.enabled),
        }
    }

    /// Per-statement TTL if given, else the configured default
    pub fn ttl_for(&self, directive: Option<&CacheDirective>) -> Duration {
        directive.and_then(|d| d.ttl).unwrap_or(self.default_ttl)
    }

    /// Case-insensitive substring match against the excluded tables
    pub fn is_excluded(&self, text: &str) -> bool {
        self.excluded_by(text).is_some()
    }

    /// First excluded table the text mentions
    pub fn excluded_by(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.excluded
            .iter()
            .find(|table| lowered.contains(table.as_str()))
            .map(String::as_str)
    }

    /// Decide how a statement is handled.
    ///
    /// Writes are not subject to strategy or directives: skipping
    /// invalidation for an unmarked write would leave stale reads behind.
    pub fn route(&self, statement: &Statement, directive: Option<&CacheDirective>) -> Route {
        if statement.kind == StatementKind::Other {
            return Route::Bypass(BypassReason::NotCacheableKind);
        }
        if !self.enabled {
            return Route::Bypass(BypassReason::Disabled);
        }
        if let Some(table) = self.excluded_by(&statement.sql) {
            return Route::Bypass(BypassReason::Excluded(table.to_string()));
        }
        if statement.kind == StatementKind::Write {
            return Route::Invalidate;
        }
        if !self.is_cacheable(statement, directive) {
            return Route::Bypass(BypassReason::NotSelected);
        }

        let ttl = self.ttl_for(directive);
        if ttl.is_zero() {
            return Route::Bypass(BypassReason::ZeroTtl);
        }
        Route::Read { ttl }
    }
}
