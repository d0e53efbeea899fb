//! UnifiedError trait implementation for QueryCacheError

use super::types::{QueryCacheError, UnifiedError};

impl UnifiedError for QueryCacheError {
    fn error_code(&self) -> &str {
        match self {
            Self::Config { .. } => "QC_CONFIG",
            Self::FormatMismatch { .. } => "QC_FORMAT_MISMATCH",
            Self::ParseDegraded { .. } => "QC_PARSE_DEGRADED",
            Self::StoreUnavailable { .. } => "QC_STORE_UNAVAILABLE",
            Self::Execution { .. } => "QC_EXECUTION",
            Self::InvalidInput { .. } => "QC_INVALID_INPUT",
            Self::Io { .. } => "QC_IO",
            Self::Json { .. } => "QC_JSON",
            Self::Other { .. } => "QC_OTHER",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Config { message, .. } => message,
            Self::FormatMismatch { .. } => "Placeholder count does not match bound values",
            Self::ParseDegraded { message, .. } => message,
            Self::StoreUnavailable { message, .. } => message,
            Self::Execution { message, .. } => message,
            Self::InvalidInput { message, .. } => message,
            Self::Io { message, .. } => message,
            Self::Json { message } => message,
            Self::Other { message, .. } => message,
        }
    }

    fn context(&self) -> Option<&str> {
        match self {
            Self::Config { context, .. } => context.as_deref(),
            Self::ParseDegraded { context, .. } => context.as_deref(),
            Self::StoreUnavailable { context, .. } => context.as_deref(),
            Self::Execution { context, .. } => context.as_deref(),
            Self::InvalidInput { field, .. } => field.as_deref(),
            Self::Io { path, .. } => path.as_deref(),
            Self::Other { context, .. } => context.as_deref(),
            Self::FormatMismatch { .. } | Self::Json { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}
