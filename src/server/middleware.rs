use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Instrument;
use uuid::Uuid;

use super::AppState;
use crate::database::RequestSessionScope;
use crate::error::AppError;
use crate::metrics::HttpMetrics;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request database session middleware.
///
/// Opens a session before the handler runs, binds it as the current session
/// for everything the handler awaits, and releases it after the handler has
/// produced a response (success or error). A failure to release is logged and
/// never replaces the handler's response. If the request future is dropped
/// mid-flight the scope's destructor releases the session instead.
pub async fn request_session(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let request_id = request_id(&req);

    let span = tracing::info_span!("request_session", request_id = %request_id);
    let mut response = handle_in_scope(&state, request_id, req, next)
        .instrument(span)
        .await;

    if let Ok(v) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, v);
    }
    HttpMetrics::record_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );

    response
}

async fn handle_in_scope(
    state: &AppState,
    request_id: Uuid,
    req: Request<Body>,
    next: Next,
) -> Response {
    let factory = match state.database.session_factory() {
        Ok(factory) => factory,
        Err(e) => return AppError::from(e).into_response(),
    };

    let mut scope = RequestSessionScope::new(request_id);
    if let Err(e) = scope.begin(&factory).await {
        return AppError::from(e).into_response();
    }

    let response = match scope.run(next.run(req)).await {
        Ok(response) => response,
        Err(e) => AppError::from(e).into_response(),
    };

    if let Err(e) = scope.end().await {
        tracing::error!(
            request_id = %request_id,
            error = %e,
            "Failed to release request session"
        );
    }

    response
}

/// Reuse a caller-supplied request id when it is a UUID.
fn request_id(req: &Request<Body>) -> Uuid {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .unwrap_or_else(Uuid::new_v4)
}
