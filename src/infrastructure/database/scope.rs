//! Request-scoped session binding.
//!
//! A [`RequestSessionScope`] acquires one session per request, exposes it to
//! everything awaited inside the request future through a task-local binding,
//! and releases it exactly once afterwards. The binding is installed with
//! [`tokio::task_local!`] scoping, which restores whatever binding was active
//! before once the request future completes or is dropped, so one scope can
//! never clear another scope's session.
//!
//! ```text
//! NoScope --begin--> Active --end/drop--> Ended
//! ```

use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;

use super::factory::SessionFactory;
use super::session::Session;
use super::stats::SessionStats;
use super::DbError;

tokio::task_local! {
    static CURRENT_SESSION: Session;
}

/// The session bound to the current request.
///
/// Fails with [`DbError::NoActiveSession`] outside a scope (including tasks
/// spawned from within one, which do not inherit the binding) and once the
/// bound session has been closed.
pub fn current_session() -> Result<Session, DbError> {
    let session = CURRENT_SESSION
        .try_with(Session::clone)
        .map_err(|_| DbError::NoActiveSession)?;

    if session.is_closed() {
        return Err(DbError::NoActiveSession);
    }
    Ok(session)
}

/// Lifecycle position of a [`RequestSessionScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    NoScope,
    Active,
    Ended,
}

/// Per-request session bracket.
pub struct RequestSessionScope {
    request_id: Uuid,
    state: ScopeState,
    session: Option<Session>,
    stats: Option<Arc<SessionStats>>,
}

impl RequestSessionScope {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            state: ScopeState::NoScope,
            session: None,
            stats: None,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn state(&self) -> ScopeState {
        self.state
    }

    /// The session held by an active scope.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Acquire a session for this request.
    pub async fn begin(&mut self, factory: &SessionFactory) -> Result<(), DbError> {
        if self.state != ScopeState::NoScope {
            return Err(DbError::ScopeAlreadyBegun);
        }

        let session = factory.new_session().await?;
        tracing::debug!(
            request_id = %self.request_id,
            session_id = session.id(),
            "Session scope begun"
        );

        factory.stats().record_scope_begun();
        self.stats = Some(factory.stats().clone());
        self.session = Some(session);
        self.state = ScopeState::Active;
        Ok(())
    }

    /// Drive `future` with this scope's session as the current session.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, DbError>
    where
        F: Future,
    {
        let session = match (&self.state, &self.session) {
            (ScopeState::Active, Some(session)) => session.clone(),
            _ => return Err(DbError::ScopeNotActive),
        };

        Ok(CURRENT_SESSION.scope(session, future).await)
    }

    /// Release the session. Runs at most once per scope.
    ///
    /// The binding is dropped before the connection is released, so a failing
    /// close still leaves the scope `Ended` with no reference to the session.
    pub async fn end(&mut self) -> Result<(), DbError> {
        if self.state != ScopeState::Active {
            return Err(DbError::ScopeNotActive);
        }

        self.state = ScopeState::Ended;
        let session = self.session.take();
        if let Some(stats) = &self.stats {
            stats.record_scope_ended(false);
        }

        let Some(session) = session else {
            return Ok(());
        };

        let session_id = session.id();
        let result = session.close().await;
        match &result {
            Ok(()) => tracing::debug!(
                request_id = %self.request_id,
                session_id,
                "Session scope ended"
            ),
            Err(e) => tracing::error!(
                request_id = %self.request_id,
                session_id,
                error = %e,
                "Failed to close request session"
            ),
        }
        result
    }
}

impl Drop for RequestSessionScope {
    fn drop(&mut self) {
        if self.state != ScopeState::Active {
            return;
        }

        self.state = ScopeState::Ended;
        if let Some(session) = self.session.take() {
            tracing::warn!(
                request_id = %self.request_id,
                session_id = session.id(),
                "Session scope dropped before end, releasing session"
            );
            session.release_now();
        }
        if let Some(stats) = &self.stats {
            stats.record_scope_ended(true);
        }
    }
}
