//! Process-wide database manager with an explicit initialize/dispose lifecycle.

use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde::Serialize;
use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::ConnectOptions;

use super::config::PoolConfig;
use super::factory::{PoolStatus, SessionFactory};
use super::schema::create_schema;
use super::session::Session;
use super::stats::{SessionStats, SessionStatsSnapshot};
use super::DbError;

static INSTANCE: OnceLock<Arc<DatabaseManager>> = OnceLock::new();

/// Lifecycle state reported by [`DatabaseManager::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerStatus {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

impl ManagerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerStatus::Uninitialized => "uninitialized",
            ManagerStatus::Initializing => "initializing",
            ManagerStatus::Ready => "ready",
            ManagerStatus::Disposed => "disposed",
        }
    }
}

enum ManagerState {
    Uninitialized,
    Initializing,
    Ready {
        factory: Arc<SessionFactory>,
        config: PoolConfig,
    },
    Disposed,
}

/// Owns the connection pool and its session factory.
///
/// The state lock is never held across an `.await`; long-running phases
/// (connecting, draining) run after the state has been moved to a
/// transitional value so concurrent callers fail fast instead of blocking.
pub struct DatabaseManager {
    state: RwLock<ManagerState>,
    stats: Arc<SessionStats>,
}

impl DatabaseManager {
    /// Create an isolated, uninitialized manager.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ManagerState::Uninitialized),
            stats: Arc::new(SessionStats::new()),
        }
    }

    /// The process-wide instance, created on first use.
    pub fn instance() -> Arc<DatabaseManager> {
        INSTANCE.get_or_init(|| Arc::new(DatabaseManager::new())).clone()
    }

    /// Create the pool, verify connectivity and ensure the schema exists.
    ///
    /// Not idempotent: a second call fails with [`DbError::AlreadyInitialized`]
    /// and leaves the existing pool untouched.
    pub async fn initialize(&self, config: &PoolConfig) -> Result<(), DbError> {
        {
            let mut state = self.state.write();
            match &*state {
                ManagerState::Uninitialized => *state = ManagerState::Initializing,
                ManagerState::Initializing => return Err(DbError::InitializationInProgress),
                ManagerState::Ready { .. } => return Err(DbError::AlreadyInitialized),
                ManagerState::Disposed => return Err(DbError::Disposed),
            }
        }

        // Resets the state if this future is dropped before completing.
        let guard = InitGuard { manager: self };

        tracing::info!(
            url = %config.url_masked(),
            pool_size = config.pool_size(),
            max_overflow = config.max_overflow(),
            "Initializing database..."
        );

        match self.build_factory(config).await {
            Ok(factory) => {
                *self.state.write() = ManagerState::Ready {
                    factory: Arc::new(factory),
                    config: config.clone(),
                };
                guard.complete();
                tracing::info!("Database initialized");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Database initialization failed");
                Err(e)
            }
        }
    }

    async fn build_factory(&self, config: &PoolConfig) -> Result<SessionFactory, DbError> {
        sqlx::any::install_default_drivers();

        let mut options = AnyConnectOptions::from_str(config.url())
            .map_err(|e| DbError::Config(format!("invalid database URL: {e}")))?;
        if !config.echo() {
            options = options.disable_statement_logging();
        }

        let pool = AnyPoolOptions::new()
            .min_connections(config.pool_size())
            .max_connections(config.max_connections())
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(config.idle_timeout())
            .connect_with(options)
            .await?;

        let schema_result = match pool.acquire().await {
            Ok(mut conn) => create_schema(&mut conn, config.dialect()).await,
            Err(e) => Err(DbError::from(e)),
        };
        if let Err(e) = schema_result {
            pool.close().await;
            return Err(e);
        }

        tracing::info!(
            dialect = config.dialect().as_str(),
            max_connections = config.max_connections(),
            "Connection pool created"
        );

        Ok(SessionFactory::new(
            pool,
            config.dialect(),
            config.max_connections(),
            self.stats.clone(),
        ))
    }

    /// Close the pool and mark the manager disposed.
    ///
    /// New borrows fail as soon as this is called. Idle connections close at
    /// once; borrowed ones are awaited up to the configured drain timeout, and
    /// any still out after that are closed when their sessions release them.
    pub async fn dispose(&self) -> Result<(), DbError> {
        let (factory, config) = {
            let mut state = self.state.write();
            match &*state {
                ManagerState::Uninitialized => return Err(DbError::NotInitialized),
                ManagerState::Initializing => return Err(DbError::InitializationInProgress),
                ManagerState::Disposed => return Err(DbError::Disposed),
                ManagerState::Ready { .. } => {}
            }
            match std::mem::replace(&mut *state, ManagerState::Disposed) {
                ManagerState::Ready { factory, config } => (factory, config),
                _ => unreachable!("state checked above"),
            }
        };

        let drained = factory.shutdown(config.drain_timeout()).await;
        tracing::info!(drained, "Database connections closed");
        Ok(())
    }

    /// The session factory of an initialized manager.
    pub fn session_factory(&self) -> Result<Arc<SessionFactory>, DbError> {
        match &*self.state.read() {
            ManagerState::Ready { factory, .. } => Ok(factory.clone()),
            ManagerState::Uninitialized | ManagerState::Initializing => {
                Err(DbError::NotInitialized)
            }
            ManagerState::Disposed => Err(DbError::Disposed),
        }
    }

    /// Borrow a connection and open a new session.
    pub async fn new_session(&self) -> Result<Session, DbError> {
        self.session_factory()?.new_session().await
    }

    pub fn status(&self) -> ManagerStatus {
        match &*self.state.read() {
            ManagerState::Uninitialized => ManagerStatus::Uninitialized,
            ManagerState::Initializing => ManagerStatus::Initializing,
            ManagerState::Ready { .. } => ManagerStatus::Ready,
            ManagerState::Disposed => ManagerStatus::Disposed,
        }
    }

    /// Pool occupancy, if the manager is initialized.
    pub fn pool_status(&self) -> Option<PoolStatus> {
        match &*self.state.read() {
            ManagerState::Ready { factory, .. } => Some(factory.status()),
            _ => None,
        }
    }

    /// The configuration the pool was built with, if initialized.
    pub fn config(&self) -> Option<PoolConfig> {
        match &*self.state.read() {
            ManagerState::Ready { config, .. } => Some(config.clone()),
            _ => None,
        }
    }

    pub fn stats(&self) -> SessionStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for DatabaseManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the manager to `Uninitialized` unless initialization completed.
struct InitGuard<'a> {
    manager: &'a DatabaseManager,
}

impl InitGuard<'_> {
    fn complete(self) {
        std::mem::forget(self);
    }
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.manager.state.write();
        if matches!(*state, ManagerState::Initializing) {
            *state = ManagerState::Uninitialized;
        }
    }
}
