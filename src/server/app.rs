use axum::{http::HeaderValue, middleware, Router};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::api::{api_routes, status_routes};

use super::middleware::request_session;
use super::AppState;

/// Maximum accepted request body (user payloads are tiny)
const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn create_app(state: AppState) -> Router {
    // CORS configuration (any origin unless an allow-list is configured)
    let origins: Vec<HeaderValue> = state
        .settings
        .server
        .cors_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any);

    // Only API routes borrow a database session; status endpoints must keep answering
    // when the pool is exhausted.
    let api = api_routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        request_session,
    ));

    Router::new()
        .merge(status_routes())
        .merge(api)
        // Add middleware
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Add state
        .with_state(state)
}
