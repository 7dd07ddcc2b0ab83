//! Connection trait

use crate::{QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;

/// A single database session.
///
/// Session-scoped state (statement timeout, planner extension state such as
/// hypothetical indexes) lives on the session, so every call made through one
/// `Connection` observes the effects of the previous calls. Implementations
/// must serialize calls issued concurrently against the same session.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgresql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that does not return rows
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Apply a session-local statement timeout for the statements that follow.
    async fn set_statement_timeout(&self, timeout_ms: u64) -> Result<()> {
        self.execute(&format!("SET statement_timeout = {}", timeout_ms), &[])
            .await?;
        Ok(())
    }

    /// Queue a statement to run on this session before the next `execute` or
    /// `query`. Callable from synchronous code such as `Drop`. Returns false
    /// when the session cannot defer statements.
    fn defer_statement(&self, _sql: &str) -> bool {
        false
    }

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
