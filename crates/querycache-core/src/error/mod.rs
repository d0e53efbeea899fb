//! Error types for the query cache
//!
//! All cache-layer failures share one enum. Only `Execution` errors ever reach
//! the caller of an intercepted statement; everything else is absorbed by the
//! coordinator and surfaced through logs and statistics.

mod constructors;
mod conversions;
mod types;
mod unified_error;

pub use types::{QueryCacheError, QueryCacheResult, ResultExt, UnifiedError};
