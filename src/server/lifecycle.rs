//! Application lifecycle hooks for the database layer.
//!
//! `on_startup` runs before the listener accepts connections and
//! `on_shutdown` after the server has drained in-flight requests.

use crate::database::{DatabaseManager, DbError, PoolConfig};

/// Initialize the connection pool and schema.
pub async fn on_startup(database: &DatabaseManager, config: &PoolConfig) -> Result<(), DbError> {
    database.initialize(config).await
}

/// Dispose the connection pool.
pub async fn on_shutdown(database: &DatabaseManager) -> Result<(), DbError> {
    match database.dispose().await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "Database disposal failed");
            Err(e)
        }
    }
}
