use axum::{routing::get, Router};

use crate::server::AppState;

use super::health::{health, root};
use super::metrics::prometheus_metrics;
use super::users::{create_user, get_user, list_users};

/// Liveness, health and metrics endpoints (no database session).
pub fn status_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
}

/// Versioned API endpoints (each request runs in a session scope).
pub fn api_routes() -> Router<AppState> {
    Router::new().nest(
        "/api/v1",
        Router::new()
            .route("/users", get(list_users).post(create_user))
            .route("/users/{id}", get(get_user)),
    )
}
