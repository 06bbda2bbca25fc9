//! Error taxonomy for the pool manager, session factory and request scopes.

use thiserror::Error;

/// Errors raised by the database lifecycle and session layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Invalid pool configuration (fails startup)
    #[error("Invalid database configuration: {0}")]
    Config(String),

    /// The manager has not been initialized yet
    #[error("Database not initialized, call initialize() first")]
    NotInitialized,

    /// `initialize` was called on an already initialized manager
    #[error("Database already initialized")]
    AlreadyInitialized,

    /// Another task is currently initializing the manager
    #[error("Database initialization in progress")]
    InitializationInProgress,

    /// The manager has been disposed and no longer hands out sessions
    #[error("Database has been disposed")]
    Disposed,

    /// No pooled connection became available within the acquire timeout
    #[error("Connection pool exhausted: timed out waiting for a connection")]
    PoolExhausted,

    /// Session lookup outside of a request scope
    #[error("No active database session in this context")]
    NoActiveSession,

    /// `begin` called on a scope that has already begun (or ended)
    #[error("Session scope already begun")]
    ScopeAlreadyBegun,

    /// `run`/`end` called on a scope that is not active
    #[error("Session scope is not active")]
    ScopeNotActive,

    /// The session has already been closed
    #[error("Session is closed")]
    SessionClosed,

    /// Releasing the session's connection failed
    #[error("Failed to close session: {0}")]
    SessionClose(#[source] sqlx::Error),

    /// Statement or connection failure
    #[error(transparent)]
    Database(sqlx::Error),
}

impl DbError {
    /// Whether the underlying failure is a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Database(e) => e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation()),
            _ => false,
        }
    }

    /// Whether the error means the service cannot hand out sessions right now.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            DbError::PoolExhausted
                | DbError::NotInitialized
                | DbError::InitializationInProgress
                | DbError::Disposed
        )
    }
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::Disposed,
            other => DbError::Database(other),
        }
    }
}
