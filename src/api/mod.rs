//! API layer - HTTP endpoint handlers organized by domain.

mod health;
mod metrics;
mod routes;
mod users;

// Re-export all handlers for use in server/app.rs
pub use health::{health, root};
pub use metrics::prometheus_metrics;
pub use routes::{api_routes, status_routes};
pub use users::{create_user, get_user, list_users, ListUsersQuery};
