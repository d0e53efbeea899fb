//! From trait implementations for QueryCacheError conversions

use super::types::QueryCacheError;

impl From<std::io::Error> for QueryCacheError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for QueryCacheError {
    fn from(error: serde_json::Error) -> Self {
        Self::json(error.to_string())
    }
}

impl From<toml::de::Error> for QueryCacheError {
    fn from(error: toml::de::Error) -> Self {
        Self::config(format!("Failed to parse TOML config: {}", error))
    }
}

impl From<serde_yaml::Error> for QueryCacheError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::config(format!("Failed to parse YAML config: {}", error))
    }
}
