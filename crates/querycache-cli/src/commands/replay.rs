//! Replay a statement log through an in-memory cache

use crate::console::CliConsole;
use async_trait::async_trait;
use colored::*;
use querycache_core::error::{QueryCacheError, QueryCacheResult};
use querycache_core::{
    BoundValue, InterceptedStatement, InterceptionCoordinator, MemoryTaggedStore, Outcome,
    Payload, Statement, StatementExecutor, load_config,
};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// One line of a replay file
#[derive(Debug, Deserialize)]
struct ReplayLine {
    sql: String,
    #[serde(default)]
    bindings: Vec<BoundValue>,
    /// `true` marks the statement cacheable, `false` opts it out
    #[serde(default)]
    cache: Option<bool>,
    /// TTL override in seconds, implies `cache: true`
    #[serde(default)]
    ttl: Option<u64>,
}

impl ReplayLine {
    fn into_intercepted(self) -> InterceptedStatement {
        let intercepted = Statement::new(self.sql, self.bindings).intercept();
        match (self.cache, self.ttl) {
            (Some(false), _) => intercepted.no_cache(),
            (_, Some(secs)) => intercepted.cache_for(Duration::from_secs(secs)),
            (Some(true), None) => intercepted.cache(),
            (None, None) => intercepted,
        }
    }
}

/// Stand-in database: answers every statement with its execution number
#[derive(Default)]
struct EchoExecutor {
    executions: AtomicUsize,
}

#[async_trait]
impl StatementExecutor for EchoExecutor {
    async fn execute(&self, statement: &Statement) -> QueryCacheResult<Payload> {
        let n = self.executions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "execution": n, "sql": statement.sql }))
    }
}

fn parse_lines(text: &str) -> QueryCacheResult<Vec<ReplayLine>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| {
                QueryCacheError::json(format!("Invalid replay line {}: {}", idx + 1, e))
            })
        })
        .collect()
}

/// Replay every statement in `file` and report how each was handled
pub async fn run(config_path: &Path, file: &Path) -> QueryCacheResult<()> {
    let console = CliConsole::new();
    let config = load_config(config_path)?;

    let text = tokio::fs::read_to_string(file).await.map_err(|e| {
        QueryCacheError::io_with_path(
            format!("Failed to read replay file: {}", e),
            file.display().to_string(),
        )
    })?;
    let lines = parse_lines(&text)?;
    debug!("Replaying {} with strategy {}", file.display(), config.strategy);

    let executor = Arc::new(EchoExecutor::default());
    let coordinator = InterceptionCoordinator::new(
        &config,
        Arc::new(MemoryTaggedStore::new()),
        executor.clone(),
    );

    console.print_header(&format!("Replaying {} statement(s)", lines.len()));
    for (idx, line) in lines.into_iter().enumerate() {
        let intercepted = line.into_intercepted();
        let sql = intercepted.statement.sql.clone();
        match coordinator.intercept(&intercepted).await {
            Ok(interception) => {
                let outcome = match &interception.outcome {
                    Outcome::ReadHit => interception.outcome.to_string().green(),
                    Outcome::ReadMiss { .. } => interception.outcome.to_string().yellow(),
                    Outcome::WriteInvalidate { .. } => interception.outcome.to_string().magenta(),
                    Outcome::Bypass(_) => interception.outcome.to_string().dimmed(),
                };
                println!("{:>4}  {:<24} {}", idx + 1, outcome, sql);
            }
            Err(e) => console.error(&format!("{:>4}  {}: {}", idx + 1, sql, e)),
        }
    }

    println!();
    console.field("Executions", executor.executions.load(Ordering::SeqCst));
    console.field("Cached entries", coordinator.cache().backend().len().await?);
    console.success(&coordinator.stats().summary());
    Ok(())
}
