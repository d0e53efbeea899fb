//! Execution boundary

use crate::cache::Payload;
use crate::error::QueryCacheResult;
use crate::statement::Statement;
use async_trait::async_trait;

/// Runs statements against the database engine.
///
/// Supplied by the surrounding data-access layer. Engine failures should be
/// reported as [`QueryCacheError::Execution`](crate::error::QueryCacheError::Execution);
/// they reach the caller unchanged.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    async fn execute(&self, statement: &Statement) -> QueryCacheResult<Payload>;
}
