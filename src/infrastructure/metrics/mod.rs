//! Prometheus metrics for the user records service.
//!
//! This module provides metrics for monitoring the database session layer:
//! - Session metrics (opened, closed, close failures, active)
//! - Request scope metrics (begun, ended, released on drop)
//! - Pool metrics (size, idle connections, acquire latency, exhaustion)
//! - HTTP request latency

mod helpers;

pub use helpers::{encode_metrics, HttpMetrics, PoolMetrics, SessionMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "coffee_tracker";

lazy_static! {
    // ============================================================================
    // Session Metrics
    // ============================================================================

    /// Total sessions opened (connections borrowed from the pool)
    pub static ref SESSIONS_OPENED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sessions_opened_total", METRIC_PREFIX),
        "Total database sessions opened"
    ).unwrap();

    /// Total sessions closed (connections returned or discarded)
    pub static ref SESSIONS_CLOSED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sessions_closed_total", METRIC_PREFIX),
        "Total database sessions closed"
    ).unwrap();

    /// Total failures while closing a session
    pub static ref SESSION_CLOSE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_session_close_failures_total", METRIC_PREFIX),
        "Total failures while releasing a database session"
    ).unwrap();

    /// Sessions currently holding a connection
    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_sessions_active", METRIC_PREFIX),
        "Number of database sessions currently holding a connection"
    ).unwrap();

    // ============================================================================
    // Request Scope Metrics
    // ============================================================================

    /// Request scopes begun
    pub static ref SCOPES_BEGUN_TOTAL: IntCounter = register_int_counter!(
        format!("{}_session_scopes_begun_total", METRIC_PREFIX),
        "Total request session scopes begun"
    ).unwrap();

    /// Request scopes ended, by how they ended (end or drop)
    pub static ref SCOPES_ENDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_session_scopes_ended_total", METRIC_PREFIX),
        "Total request session scopes ended",
        &["how"]
    ).unwrap();

    // ============================================================================
    // Pool Metrics
    // ============================================================================

    /// Connections currently open in the pool
    pub static ref POOL_CONNECTIONS: IntGauge = register_int_gauge!(
        format!("{}_pool_connections", METRIC_PREFIX),
        "Number of open connections in the pool"
    ).unwrap();

    /// Idle connections in the pool
    pub static ref POOL_IDLE_CONNECTIONS: IntGauge = register_int_gauge!(
        format!("{}_pool_idle_connections", METRIC_PREFIX),
        "Number of idle connections in the pool"
    ).unwrap();

    /// Borrow attempts that timed out
    pub static ref POOL_EXHAUSTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_pool_exhausted_total", METRIC_PREFIX),
        "Total connection borrows that timed out"
    ).unwrap();

    /// Time spent waiting for a pooled connection
    pub static ref POOL_ACQUIRE_LATENCY: Histogram = register_histogram!(
        format!("{}_pool_acquire_latency_seconds", METRIC_PREFIX),
        "Time spent waiting for a pooled connection in seconds",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    ).unwrap();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// HTTP request latency
    pub static ref HTTP_REQUEST_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_http_request_latency_seconds", METRIC_PREFIX),
        "HTTP request latency in seconds",
        &["method", "path", "status"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    ).unwrap();
}
