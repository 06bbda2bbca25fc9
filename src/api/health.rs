//! Health check endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::database::{PoolStatus, SessionStatsSnapshot};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: DatabaseHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealthResponse {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStatus>,
    pub sessions: SessionStatsSnapshot,
    pub active_sessions: u64,
}

/// GET / - Liveness message
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "API is running!".to_string(),
    })
}

/// GET /health - Service and pool health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_state = state.database.status();
    let pool = state.database.pool_status();
    let dialect = state
        .database
        .config()
        .map(|c| c.dialect().as_str().to_string());
    let sessions = state.database.stats();

    let status = if pool.is_some() { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        database: DatabaseHealthResponse {
            state: db_state.as_str().to_string(),
            dialect,
            pool,
            active_sessions: sessions.active_sessions(),
            sessions,
        },
    })
}
