//! Configuration management
//!
//! The configuration is loaded once at startup from, in order, built-in
//! defaults, an optional file (TOML, YAML or JSON) and `QUERY_CACHE_*`
//! environment variables.

pub mod env_loader;
pub mod file_loader;
pub mod loader;
pub mod model;

pub use loader::{ConfigLoader, ConfigSource, load_config};
pub use model::{CacheStrategy, DEFAULT_EXCLUDED_TABLES, QueryCacheConfig};
