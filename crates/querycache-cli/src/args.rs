//! CLI argument definitions using clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file name used across all CLI commands.
pub const DEFAULT_CONFIG_FILE: &str = "query_cache.toml";

#[derive(Parser)]
#[command(name = "querycache")]
#[command(about = "Inspect query cache keys, tags and policy decisions")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// A statement given on the command line
#[derive(Args, Clone)]
pub struct StatementArgs {
    /// SQL text with positional `?` placeholders
    pub sql: String,

    /// Bound value, repeat in placeholder order (null, true, 42, 1.5 or text)
    #[arg(short = 'b', long = "bind")]
    pub bindings: Vec<String>,

    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the materialized statement and its cache key
    Key(StatementArgs),

    /// Show the tags a statement stores under or flushes
    Tags(StatementArgs),

    /// Show whether the configured policy would cache a statement
    Check {
        #[command(flatten)]
        statement: StatementArgs,

        /// Mark the statement cacheable
        #[arg(long, conflicts_with = "no_cache")]
        cache: bool,

        /// Opt the statement out of caching
        #[arg(long)]
        no_cache: bool,

        /// TTL override in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Run a JSON-lines statement log through an in-memory cache
    Replay {
        /// File with one `{"sql", "bindings", "cache", "ttl"}` object per line
        file: PathBuf,
    },

    /// Manage configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigAction {
    /// Display the effective configuration
    Show,

    /// Validate the configuration file
    Validate,

    /// Write a configuration file with the defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
