//! Transaction-scoped session over one borrowed pooled connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::any::Any;
use sqlx::pool::PoolConnection;
use sqlx::{AnyConnection, Connection};
use tokio::sync::Mutex;

use super::schema::Dialect;
use super::stats::SessionStats;
use super::DbError;

/// Handle to a database session.
///
/// Cloning is cheap and yields another handle to the same session. A session
/// is meant to be driven by one request at a time; concurrent use from
/// several tasks is serialized on the connection rather than interleaved.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: u64,
    dialect: Dialect,
    conn: Mutex<Option<PoolConnection<Any>>>,
    closed: AtomicBool,
    /// Set when a transaction future was dropped before it settled.
    poisoned: AtomicBool,
    stats: Arc<SessionStats>,
}

impl Session {
    pub(crate) fn new(
        id: u64,
        conn: PoolConnection<Any>,
        dialect: Dialect,
        stats: Arc<SessionStats>,
    ) -> Self {
        stats.record_session_opened();
        Self {
            inner: Arc::new(SessionInner {
                id,
                dialect,
                conn: Mutex::new(Some(conn)),
                closed: AtomicBool::new(false),
                poisoned: AtomicBool::new(false),
                stats,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.dialect
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Whether two handles refer to the same session.
    pub fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` inside a single transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`. If the
    /// returned future is dropped midway the session is marked for discard and
    /// its connection is closed instead of being returned to the pool.
    pub async fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut AnyConnection) -> BoxFuture<'c, Result<T, E>>,
        E: From<DbError>,
    {
        if self.is_closed() {
            return Err(DbError::SessionClosed.into());
        }

        let mut guard = self.inner.conn.lock().await;
        let conn = guard.as_mut().ok_or(DbError::SessionClosed)?;

        let mut tx = conn.begin().await.map_err(DbError::from)?;
        let poison = PoisonGuard::arm(&self.inner.poisoned);

        let result = f(&mut *tx).await;
        let outcome = match result {
            Ok(value) => match tx.commit().await {
                Ok(()) => Ok(value),
                Err(e) => Err(DbError::from(e).into()),
            },
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        session_id = self.inner.id,
                        error = %rollback_err,
                        "Transaction rollback failed"
                    );
                }
                Err(e)
            }
        };

        poison.disarm();
        outcome
    }

    /// Release the session's connection. Succeeds at most once.
    ///
    /// A healthy connection goes back to the pool; a connection left in an
    /// unknown state by a cancelled transaction is closed instead, and a
    /// failure to close it is returned as [`DbError::SessionClose`].
    pub async fn close(&self) -> Result<(), DbError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(DbError::SessionClosed);
        }

        let conn = self.inner.conn.lock().await.take();
        self.inner.release(conn).await
    }

    /// Synchronous release for destructors. Returns `false` if the session was
    /// already closed.
    pub(crate) fn release_now(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        match self.inner.conn.try_lock() {
            Ok(mut guard) => match guard.take() {
                Some(conn) if self.inner.poisoned.load(Ordering::Acquire) => {
                    // Detached connections are closed on drop instead of pooled.
                    drop(conn.detach());
                    self.inner.stats.record_session_discarded();
                    tracing::debug!(session_id = self.inner.id, "Discarded poisoned connection");
                }
                // Dropping a PoolConnection hands it back to the pool.
                conn => drop(conn),
            },
            Err(_) => {
                // Still in use by another handle; SessionInner::drop settles it.
                tracing::debug!(session_id = self.inner.id, "Connection busy during release");
            }
        }
        self.inner.stats.record_session_closed();
        true
    }
}

impl SessionInner {
    async fn release(&self, conn: Option<PoolConnection<Any>>) -> Result<(), DbError> {
        let result = match conn {
            Some(conn) if self.poisoned.load(Ordering::Acquire) => {
                self.stats.record_session_discarded();
                conn.detach().close().await.map_err(DbError::SessionClose)
            }
            Some(conn) => {
                drop(conn);
                Ok(())
            }
            None => Ok(()),
        };

        self.stats.record_session_closed();
        if result.is_err() {
            self.stats.record_close_failure();
        }

        tracing::trace!(session_id = self.id, ok = result.is_ok(), "Session closed");
        result
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::warn!(session_id = self.id, "Session dropped without being closed");
            self.stats.record_session_closed();
        }
        // A healthy connection still held is returned by PoolConnection's own drop.
        if let Some(conn) = self.conn.get_mut().take() {
            if *self.poisoned.get_mut() {
                drop(conn.detach());
                self.stats.record_session_discarded();
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("dialect", &self.inner.dialect)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Marks the session poisoned unless disarmed before being dropped.
struct PoisonGuard<'a> {
    flag: &'a AtomicBool,
    armed: bool,
}

impl<'a> PoisonGuard<'a> {
    fn arm(flag: &'a AtomicBool) -> Self {
        Self { flag, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PoisonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::Release);
        }
    }
}
