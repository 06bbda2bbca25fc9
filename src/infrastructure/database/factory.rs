//! Session factory bound to one connection pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::AnyPool;

use crate::metrics::PoolMetrics;

use super::schema::Dialect;
use super::session::Session;
use super::stats::SessionStats;
use super::DbError;

/// Snapshot of the pool's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Open connections (idle and borrowed)
    pub size: u32,
    /// Connections waiting in the pool
    pub idle: usize,
    /// Upper bound on concurrently borrowed connections
    pub max_connections: u32,
}

/// Produces sessions backed by connections borrowed from the pool.
pub struct SessionFactory {
    pool: AnyPool,
    dialect: Dialect,
    max_connections: u32,
    stats: Arc<SessionStats>,
    next_session_id: AtomicU64,
}

impl SessionFactory {
    pub(crate) fn new(
        pool: AnyPool,
        dialect: Dialect,
        max_connections: u32,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            pool,
            dialect,
            max_connections,
            stats,
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Borrow a connection and wrap it in a fresh session.
    ///
    /// Waits up to the configured acquire timeout; waiters are served in
    /// arrival order.
    pub async fn new_session(&self) -> Result<Session, DbError> {
        let started = Instant::now();
        let conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                let err = DbError::from(e);
                if matches!(err, DbError::PoolExhausted) {
                    self.stats.record_pool_timeout();
                    tracing::warn!(
                        waited_ms = started.elapsed().as_millis() as u64,
                        max_connections = self.max_connections,
                        "Timed out waiting for a pooled connection"
                    );
                }
                return Err(err);
            }
        };
        PoolMetrics::record_acquire_latency(started.elapsed().as_secs_f64());

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(session_id = id, "Session opened");

        Ok(Session::new(id, conn, self.dialect, self.stats.clone()))
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn stats(&self) -> &Arc<SessionStats> {
        &self.stats
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max_connections: self.max_connections,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Close the pool, waiting up to `drain_timeout` for borrowed connections.
    ///
    /// Returns `true` if every connection was returned in time. Connections
    /// still borrowed afterwards are closed when their sessions release them.
    pub(crate) async fn shutdown(&self, drain_timeout: Duration) -> bool {
        match tokio::time::timeout(drain_timeout, self.pool.close()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    drain_timeout_ms = drain_timeout.as_millis() as u64,
                    borrowed = self.pool.size(),
                    "Pool drain timed out with connections still borrowed"
                );
                false
            }
        }
    }
}
