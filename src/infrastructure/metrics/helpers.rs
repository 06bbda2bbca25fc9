//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::database::PoolStatus;

use super::{
    HTTP_REQUEST_LATENCY, POOL_ACQUIRE_LATENCY, POOL_CONNECTIONS, POOL_EXHAUSTED_TOTAL,
    POOL_IDLE_CONNECTIONS, SCOPES_BEGUN_TOTAL, SCOPES_ENDED_TOTAL, SESSIONS_ACTIVE,
    SESSIONS_CLOSED_TOTAL, SESSIONS_OPENED_TOTAL, SESSION_CLOSE_FAILURES_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording session lifecycle metrics
pub struct SessionMetrics;

impl SessionMetrics {
    /// Record a session borrowing a connection
    pub fn record_opened() {
        SESSIONS_OPENED_TOTAL.inc();
        SESSIONS_ACTIVE.inc();
    }

    /// Record a session releasing its connection
    pub fn record_closed() {
        SESSIONS_CLOSED_TOTAL.inc();
        SESSIONS_ACTIVE.dec();
    }

    /// Record a failed release
    pub fn record_close_failure() {
        SESSION_CLOSE_FAILURES_TOTAL.inc();
    }

    /// Record a request scope being entered
    pub fn record_scope_begun() {
        SCOPES_BEGUN_TOTAL.inc();
    }

    /// Record a request scope being left
    pub fn record_scope_ended(dropped: bool) {
        let how = if dropped { "drop" } else { "end" };
        SCOPES_ENDED_TOTAL.with_label_values(&[how]).inc();
    }

    /// Record a borrow that timed out
    pub fn record_pool_exhausted() {
        POOL_EXHAUSTED_TOTAL.inc();
    }
}

/// Helper struct for pool metrics
pub struct PoolMetrics;

impl PoolMetrics {
    /// Record time spent waiting for a connection
    pub fn record_acquire_latency(seconds: f64) {
        POOL_ACQUIRE_LATENCY.observe(seconds);
    }

    /// Update pool gauges from a status snapshot (call on scrape)
    pub fn update(status: &PoolStatus) {
        POOL_CONNECTIONS.set(i64::from(status.size));
        POOL_IDLE_CONNECTIONS.set(status.idle as i64);
    }

    /// Reset pool gauges when no pool is available
    pub fn clear() {
        POOL_CONNECTIONS.set(0);
        POOL_IDLE_CONNECTIONS.set(0);
    }
}

/// Helper struct for HTTP metrics
pub struct HttpMetrics;

impl HttpMetrics {
    /// Record the latency of a completed request
    pub fn record_request(method: &str, path: &str, status: u16, seconds: f64) {
        HTTP_REQUEST_LATENCY
            .with_label_values(&[method, path, &status.to_string()])
            .observe(seconds);
    }
}
