//! Constructor methods for QueryCacheError

use super::types::QueryCacheError;

impl QueryCacheError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a placeholder/binding count mismatch error
    pub fn format_mismatch(placeholders: usize, bindings: usize) -> Self {
        Self::FormatMismatch {
            placeholders,
            bindings,
        }
    }

    /// Create a degraded parse error carrying the statement text
    pub fn parse_degraded_with_context(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::ParseDegraded {
            message: message.into(),
            context: Some(sql.into()),
        }
    }

    /// Create a new store unavailable error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            context: None,
        }
    }

    /// Create a store unavailable error with context
    pub fn store_unavailable_with_context(
        message: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a new execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            context: None,
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error with field
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: None,
        }
    }

    /// Create an IO error with path
    pub fn io_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create a new JSON error
    pub fn json(message: impl Into<String>) -> Self {
        Self::Json {
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            context: None,
        }
    }
}
