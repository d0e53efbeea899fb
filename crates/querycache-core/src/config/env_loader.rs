//! Environment variable-based configuration overrides

use super::model::{CacheStrategy, QueryCacheConfig};
use crate::error::{QueryCacheError, QueryCacheResult};
use std::env;
use std::str::FromStr;

/// Apply `QUERY_CACHE_*` variables from the process environment
pub fn apply_env(config: &mut QueryCacheConfig) -> QueryCacheResult<()> {
    apply_vars(config, |name| env::var(name).ok())
}

/// Apply overrides from an arbitrary variable lookup
pub(crate) fn apply_vars<F>(config: &mut QueryCacheConfig, lookup: F) -> QueryCacheResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("QUERY_CACHE_ENABLED") {
        config.enabled = parse_bool("QUERY_CACHE_ENABLED", &value)?;
    }

    if let Some(value) = lookup("QUERY_CACHE_STRATEGY") {
        config.strategy = CacheStrategy::from_str(&value)?;
    }

    if let Some(value) = lookup("QUERY_CACHE_DURATION") {
        config.duration = parse_number("QUERY_CACHE_DURATION", &value)?;
    }

    if let Some(value) = lookup("QUERY_CACHE_EXCLUDED_TABLES") {
        config.excluded_tables = value
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }

    if let Some(value) = lookup("QUERY_CACHE_SCOPED_INVALIDATION") {
        config.scoped_invalidation = parse_bool("QUERY_CACHE_SCOPED_INVALIDATION", &value)?;
    }

    if let Some(value) = lookup("QUERY_CACHE_SINGLE_FLIGHT") {
        config.single_flight = parse_bool("QUERY_CACHE_SINGLE_FLIGHT", &value)?;
    }

    if let Some(value) = lookup("QUERY_CACHE_CLEANUP_INTERVAL") {
        config.cleanup_interval = parse_number("QUERY_CACHE_CLEANUP_INTERVAL", &value)?;
    }

    Ok(())
}

fn parse_bool(name: &str, value: &str) -> QueryCacheResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(QueryCacheError::config(format!(
            "Invalid {} value: {}",
            name, value
        ))),
    }
}

fn parse_number(name: &str, value: &str) -> QueryCacheResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| QueryCacheError::config(format!("Invalid {} value: {}", name, value)))
}
