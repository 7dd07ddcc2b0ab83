//! PostgreSQL driver entry point

use qeo_core::{Connection, QeoError, Result};
use std::sync::Arc;

use crate::PostgresConnection;

/// PostgreSQL database driver
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        tracing::debug!("PostgreSQL driver initialized");
        Self
    }

    pub fn name(&self) -> &'static str {
        "postgres"
    }

    /// Open a session as a shared [`Connection`]
    #[tracing::instrument(skip(self, url))]
    pub async fn connect(&self, url: &str) -> Result<Arc<dyn Connection>> {
        let conn = PostgresConnection::connect(url).await.map_err(|e| {
            tracing::error!(error = %e, "failed to connect to PostgreSQL database");
            match e {
                QeoError::Configuration(_) => e,
                other => QeoError::Connection(format!(
                    "Failed to connect to PostgreSQL database: {}",
                    other
                )),
            }
        })?;
        Ok(Arc::new(conn))
    }

    #[tracing::instrument(skip(self, url))]
    pub async fn test_connection(&self, url: &str) -> Result<()> {
        tracing::debug!("testing PostgreSQL connection");
        let conn = self.connect(url).await?;
        conn.query("SELECT 1", &[]).await?;
        Ok(())
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}
