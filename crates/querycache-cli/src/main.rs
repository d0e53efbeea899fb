//! QueryCache CLI
//!
//! Inspect how the query cache treats a statement: the key it derives, the
//! tags it attaches or flushes and whether the configured policy caches it.
//!
//! ```bash
//! querycache key "select * from users where active = ?" -b true
//! querycache tags "update users set name = ? where id = ?" -b ann -b 1
//! querycache check "select * from posts" --cache --ttl 60
//! querycache replay statements.jsonl
//! querycache config show
//! ```

mod args;
mod commands;
mod console;
mod router;

use clap::Parser;
use querycache_core::error::QueryCacheResult;

pub use args::{Cli, Commands, ConfigAction};

#[tokio::main]
async fn main() -> QueryCacheResult<()> {
    // Set RUST_LOG=debug for verbose logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    router::route(cli).await
}
