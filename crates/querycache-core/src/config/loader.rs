//! Layered configuration loading

use super::env_loader;
use super::file_loader;
use super::model::QueryCacheConfig;
use crate::error::QueryCacheResult;
use std::path::{Path, PathBuf};

/// Source of configuration data
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Default configuration
    Default,
    /// Configuration from a file; replaces everything loaded before it
    File(PathBuf),
    /// `QUERY_CACHE_*` environment variables; override single fields
    Environment,
}

/// Configuration loader with support for multiple sources
///
/// Sources are applied in the order they were added.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration source
    pub fn add_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a file source
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Self {
        self.add_source(ConfigSource::File(path.as_ref().to_path_buf()))
    }

    /// Add environment variables source
    pub fn with_env(self) -> Self {
        self.add_source(ConfigSource::Environment)
    }

    /// Add default configuration source
    pub fn with_defaults(self) -> Self {
        self.add_source(ConfigSource::Default)
    }

    /// Load configuration from all sources
    pub fn load(self) -> QueryCacheResult<QueryCacheConfig> {
        let mut config = QueryCacheConfig::default();

        for source in &self.sources {
            apply_source(&mut config, source)?;
        }

        config.validate()?;
        tracing::debug!(
            "Loaded query cache config: enabled={}, strategy={}, duration={}s",
            config.enabled,
            config.strategy,
            config.duration
        );
        Ok(config)
    }
}

fn apply_source(config: &mut QueryCacheConfig, source: &ConfigSource) -> QueryCacheResult<()> {
    match source {
        ConfigSource::Default => {
            tracing::debug!("Loading default config");
            *config = QueryCacheConfig::default();
        }
        ConfigSource::File(path) => {
            tracing::debug!("Loading config from file: {}", path.display());
            *config = file_loader::load_from_file(path)?;
        }
        ConfigSource::Environment => {
            tracing::debug!("Loading config from environment");
            env_loader::apply_env(config)?;
        }
    }
    Ok(())
}

/// Load configuration: defaults, then the file, then environment overrides
pub fn load_config<P: AsRef<Path>>(path: P) -> QueryCacheResult<QueryCacheConfig> {
    ConfigLoader::new()
        .with_defaults()
        .with_file(path)
        .with_env()
        .load()
}
