//! Per-factory counters for session and scope lifecycles.
//!
//! These are exact, instance-scoped counts (unlike the process-wide
//! Prometheus metrics) so that balance between acquisition and release can be
//! checked for a single manager.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::metrics::SessionMetrics;

#[derive(Debug, Default)]
pub struct SessionStats {
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    close_failures: AtomicU64,
    sessions_discarded: AtomicU64,
    scopes_begun: AtomicU64,
    scopes_ended: AtomicU64,
    scopes_dropped: AtomicU64,
    pool_timeouts: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatsSnapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub close_failures: u64,
    pub sessions_discarded: u64,
    pub scopes_begun: u64,
    pub scopes_ended: u64,
    pub scopes_dropped: u64,
    pub pool_timeouts: u64,
}

impl SessionStatsSnapshot {
    /// Sessions currently holding a pooled connection.
    pub fn active_sessions(&self) -> u64 {
        self.sessions_opened.saturating_sub(self.sessions_closed)
    }

    /// Scopes begun but not yet ended.
    pub fn active_scopes(&self) -> u64 {
        self.scopes_begun.saturating_sub(self.scopes_ended)
    }
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        SessionMetrics::record_opened();
    }

    pub fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
        SessionMetrics::record_closed();
    }

    pub fn record_close_failure(&self) {
        self.close_failures.fetch_add(1, Ordering::Relaxed);
        SessionMetrics::record_close_failure();
    }

    pub fn record_session_discarded(&self) {
        self.sessions_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scope_begun(&self) {
        self.scopes_begun.fetch_add(1, Ordering::Relaxed);
        SessionMetrics::record_scope_begun();
    }

    /// `dropped` marks a scope released by its destructor instead of `end`.
    pub fn record_scope_ended(&self, dropped: bool) {
        self.scopes_ended.fetch_add(1, Ordering::Relaxed);
        if dropped {
            self.scopes_dropped.fetch_add(1, Ordering::Relaxed);
        }
        SessionMetrics::record_scope_ended(dropped);
    }

    pub fn record_pool_timeout(&self) {
        self.pool_timeouts.fetch_add(1, Ordering::Relaxed);
        SessionMetrics::record_pool_exhausted();
    }

    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            close_failures: self.close_failures.load(Ordering::Relaxed),
            sessions_discarded: self.sessions_discarded.load(Ordering::Relaxed),
            scopes_begun: self.scopes_begun.load(Ordering::Relaxed),
            scopes_ended: self.scopes_ended.load(Ordering::Relaxed),
            scopes_dropped: self.scopes_dropped.load(Ordering::Relaxed),
            pool_timeouts: self.pool_timeouts.load(Ordering::Relaxed),
        }
    }
}
