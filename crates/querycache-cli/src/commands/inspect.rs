//! Statement inspection commands

use super::statement_from;
use crate::args::StatementArgs;
use crate::console::CliConsole;
use colored::*;
use querycache_core::error::{QueryCacheError, QueryCacheResult};
use querycache_core::{
    CacheDirective, CachePolicy, KeyDeriver, Route, StatementKind, TagExtractor, TagSet,
    load_config,
};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

fn print_json(value: &serde_json::Value) -> QueryCacheResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| QueryCacheError::json(format!("Failed to render output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

/// Show the materialized text and cache key
pub fn key(args: &StatementArgs) -> QueryCacheResult<()> {
    let statement = statement_from(args);
    let deriver = KeyDeriver::new();
    let materialized = deriver.materialize(&statement.sql, &statement.bindings)?;
    let key = deriver.derive(&statement)?;

    if args.json {
        return print_json(&json!({
            "materialized": materialized,
            "key": key,
        }));
    }

    let console = CliConsole::new();
    console.print_header("Cache Key");
    console.field("Materialized", &materialized);
    console.field("Key", key.as_str().cyan());
    Ok(())
}

/// Show the tags a statement is stored under or flushes
pub fn tags(config_path: &Path, args: &StatementArgs) -> QueryCacheResult<()> {
    let config = load_config(config_path)?;
    let statement = statement_from(args);
    let extractor = TagExtractor::new(config.scoped_invalidation);
    let shape = extractor.analyze(&statement.sql, &statement.bindings, statement.kind);
    let tags: TagSet = match statement.kind {
        StatementKind::Read => extractor.storage_tags(&shape),
        StatementKind::Write => extractor.invalidation_tags(&shape),
        StatementKind::Other => extractor.extract(&statement),
    };

    if args.json {
        return print_json(&json!({
            "kind": statement.kind,
            "shape": shape,
            "tags": tags,
        }));
    }

    let console = CliConsole::new();
    console.print_header("Tags");
    console.field("Kind", statement.kind);
    console.field("Tables", shape.tables.join(", "));
    if !shape.predicates.is_empty() {
        let predicates: Vec<String> = shape
            .predicates
            .iter()
            .map(|p| format!("{} = {}", p.column, p.value))
            .collect();
        console.field("Predicates", predicates.join(" AND "));
    }
    console.field("Fully scoped", shape.fully_scoped);
    if let Some(reason) = &shape.degraded {
        console.warn(&format!("Degraded parse: {}", reason));
    }

    let label = match statement.kind {
        StatementKind::Write => "Flushes",
        _ => "Stored under",
    };
    println!();
    println!("{}", label.bold());
    for tag in &tags {
        println!("  {}", tag.as_str().cyan());
    }
    Ok(())
}

/// Show the policy verdict for a statement
pub fn check(
    config_path: &Path,
    args: &StatementArgs,
    cache: bool,
    no_cache: bool,
    ttl: Option<u64>,
) -> QueryCacheResult<()> {
    let config = load_config(config_path)?;
    let policy = CachePolicy::new(&config);
    let statement = statement_from(args);

    let directive = match (cache, no_cache, ttl) {
        (_, true, _) => Some(CacheDirective::no_cache()),
        (_, false, Some(secs)) => Some(CacheDirective::cache_for(Duration::from_secs(secs))),
        (true, false, None) => Some(CacheDirective::cache()),
        (false, false, None) => None,
    };
    let route = policy.route(&statement, directive.as_ref());

    if args.json {
        let (verdict, detail) = match &route {
            Route::Read { ttl } => ("cache", json!({ "ttl_secs": ttl.as_secs() })),
            Route::Invalidate => ("invalidate", json!(null)),
            Route::Bypass(reason) => ("bypass", json!(reason.to_string())),
        };
        return print_json(&json!({
            "kind": statement.kind,
            "strategy": config.strategy,
            "verdict": verdict,
            "detail": detail,
        }));
    }

    let console = CliConsole::new();
    console.print_header("Policy Check");
    console.field("Kind", statement.kind);
    console.field("Strategy", config.strategy);
    match route {
        Route::Read { ttl } => {
            console.success(&format!("Cacheable for {}s", ttl.as_secs()));
        }
        Route::Invalidate => {
            console.success("Write: flushes the tags it touches after executing");
        }
        Route::Bypass(reason) => {
            console.warn(&format!("Bypasses the cache: {}", reason));
        }
    }
    Ok(())
}
