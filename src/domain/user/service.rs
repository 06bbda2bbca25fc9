//! User operations over the request's ambient session.

use chrono::Utc;

use crate::database::current_session;

use super::model::{normalize_email, User, UserError};
use super::repository;

/// Stateless user service.
///
/// Every operation looks up the current request session and runs all of its
/// statements inside one transaction on it. Calling any method outside a
/// request scope fails with `NoActiveSession`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        Self
    }

    /// Insert a user and reload the stored row.
    pub async fn create_user(&self, email: &str) -> Result<User, UserError> {
        let email = normalize_email(email)?;
        let session = current_session()?;
        let now = Utc::now().timestamp();

        let stored_email = email.clone();
        let result = session
            .transaction::<_, UserError, _>(move |conn| {
                Box::pin(async move {
                    let id = repository::insert(conn, &stored_email, now).await?;
                    repository::fetch_by_id(conn, id)
                        .await?
                        .ok_or(UserError::NotFound(id))
                })
            })
            .await;

        match result {
            Ok(user) => {
                tracing::info!(user_id = user.id, session_id = session.id(), "User created");
                Ok(user)
            }
            Err(UserError::Database(e)) if e.is_unique_violation() => {
                Err(UserError::EmailTaken(email))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_users(&self) -> Result<Vec<User>, UserError> {
        let session = current_session()?;
        session
            .transaction::<_, UserError, _>(|conn| {
                Box::pin(async move { Ok(repository::fetch_all(conn).await?) })
            })
            .await
    }

    pub async fn get_user(&self, id: i64) -> Result<User, UserError> {
        let session = current_session()?;
        session
            .transaction::<_, UserError, _>(move |conn| {
                Box::pin(async move {
                    repository::fetch_by_id(conn, id)
                        .await?
                        .ok_or(UserError::NotFound(id))
                })
            })
            .await
    }

    /// Look up a user by email, compared in normalized form.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        let email = normalize_email(email)?;
        let session = current_session()?;
        session
            .transaction::<_, UserError, _>(move |conn| {
                Box::pin(async move { Ok(repository::fetch_by_email(conn, &email).await?) })
            })
            .await
    }
}
