//! Configuration management commands

use crate::console::CliConsole;
use colored::*;
use querycache_core::config::{QueryCacheConfig, file_loader::load_from_file, load_config};
use querycache_core::error::{QueryCacheError, QueryCacheResult, ResultExt};
use std::path::Path;

/// Show the effective configuration (file plus environment overrides)
pub fn show(config_file: &Path) -> QueryCacheResult<()> {
    let console = CliConsole::new();
    console.print_header("Configuration");

    if config_file.exists() {
        console.success(&format!("Loaded configuration from: {}", config_file.display()));
    } else {
        console.warn(&format!("Configuration file not found: {}", config_file.display()));
        console.info("Using default configuration");
    }

    let config = load_config(config_file)?;
    print_config(&console, &config);
    Ok(())
}

/// Validate the configuration file
pub fn validate(config_file: &Path) -> QueryCacheResult<()> {
    let console = CliConsole::new();
    console.print_header("Configuration Validation");

    if !config_file.exists() {
        return Err(QueryCacheError::config(format!(
            "Configuration file not found: {}",
            config_file.display()
        )));
    }

    console.info(&format!("Validating configuration file: {}", config_file.display()));

    let config = load_from_file(config_file).inspect_err(|e| {
        console.error(&format!("Failed to load configuration: {}", e));
    })?;
    console.success("Configuration file loaded successfully");

    config.validate().inspect_err(|e| {
        console.error(&format!("Configuration validation failed: {}", e));
    })?;
    console.success("Configuration is valid");
    Ok(())
}

/// Write a configuration file holding the defaults
pub async fn init(config_file: &Path, force: bool) -> QueryCacheResult<()> {
    let console = CliConsole::new();
    console.print_header("Configuration Initialization");

    if config_file.exists() && !force {
        console.error(&format!("Configuration file already exists: {}", config_file.display()));
        console.info("Use --force to overwrite");
        return Err(QueryCacheError::config("Configuration file already exists"));
    }

    let config = QueryCacheConfig::default();
    let rendered = match config_file.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::to_string_pretty(&config).context("Failed to serialize configuration")?,
        _ => serde_json::to_string_pretty(&config).context("Failed to serialize configuration")?,
    };

    tokio::fs::write(config_file, rendered)
        .await
        .map_err(|e| QueryCacheError::io_with_path(format!("Failed to write configuration file: {}", e), config_file.display().to_string()))?;

    console.success(&format!("Created configuration file: {}", config_file.display()));
    Ok(())
}

fn print_config(console: &CliConsole, config: &QueryCacheConfig) {
    let enabled = if config.enabled {
        "yes".green()
    } else {
        "no".red()
    };
    console.field("Enabled", enabled);
    console.field("Strategy", config.strategy);
    console.field("Default TTL", format!("{}s", config.duration));
    console.field("Excluded tables", config.excluded_tables.join(", "));
    console.field("Scoped invalidation", config.scoped_invalidation);
    console.field("Single flight", config.single_flight);
    console.field("Cleanup interval", format!("{}s", config.cleanup_interval));
}
