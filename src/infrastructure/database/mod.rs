//! Database lifecycle and request-scoped sessions.
//!
//! - [`DatabaseManager`]: owns the connection pool (initialize / dispose)
//! - [`SessionFactory`]: borrows pooled connections as [`Session`]s
//! - [`RequestSessionScope`]: binds one session to one request
//! - [`current_session`]: ambient lookup of the request's session

pub mod config;
pub mod error;
pub mod factory;
pub mod manager;
pub mod schema;
pub mod scope;
pub mod session;
pub mod stats;

pub use config::PoolConfig;
pub use error::DbError;
pub use factory::{PoolStatus, SessionFactory};
pub use manager::{DatabaseManager, ManagerStatus};
pub use schema::Dialect;
pub use scope::{current_session, RequestSessionScope, ScopeState};
pub use session::Session;
pub use stats::{SessionStats, SessionStatsSnapshot};
