//! Core error types and traits

use thiserror::Error;

/// Result type alias for query cache operations
pub type QueryCacheResult<T> = Result<T, QueryCacheError>;

/// Common accessors implemented by every query cache error.
pub trait UnifiedError: std::error::Error + Send + Sync {
    /// Get the error code for programmatic handling
    fn error_code(&self) -> &str;

    /// Get the human-readable error message
    fn message(&self) -> &str;

    /// Get optional context about the error
    fn context(&self) -> Option<&str> {
        None
    }

    /// Check if retrying the operation may succeed
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C: std::fmt::Display>(self, context: C) -> QueryCacheResult<T>;

    /// Add context lazily (only evaluated on error)
    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> QueryCacheResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn context<C: std::fmt::Display>(self, context: C) -> QueryCacheResult<T> {
        self.map_err(|e| QueryCacheError::other(format!("{}: {}", context, e)))
    }

    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> QueryCacheResult<T> {
        self.map_err(|e| QueryCacheError::other(format!("{}: {}", f(), e)))
    }
}

/// Main error type for the query cache
///
/// `Clone` is required because coalesced cache misses hand the same result,
/// error included, to every waiter.
#[derive(Error, Debug, Clone)]
pub enum QueryCacheError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// Placeholder count and bound value count disagree
    #[error("Format mismatch: statement has {placeholders} placeholder(s) but {bindings} bound value(s)")]
    FormatMismatch {
        placeholders: usize,
        bindings: usize,
    },

    /// Statement structure could only be partially understood
    #[error("Parse degraded: {message}")]
    ParseDegraded {
        message: String,
        context: Option<String>,
    },

    /// The tagged cache store failed to respond
    #[error("Cache store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        context: Option<String>,
    },

    /// The database engine failed to run the statement
    #[error("Execution error: {message}")]
    Execution {
        message: String,
        context: Option<String>,
    },

    /// Invalid input errors
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// Generic error with context
    #[error("Error: {message}")]
    Other {
        message: String,
        context: Option<String>,
    },
}
