//! User record and email normalization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::DbError;

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    /// Unix timestamp (seconds)
    pub created_at: i64,
    /// Unix timestamp (seconds)
    pub updated_at: i64,
}

/// Row as read from the `users` table.
#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            // Rows written outside this service may not be normalized
            email: row.email.trim().to_lowercase(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Request body for creating a user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub email: Option<String>,
}

/// Errors from user operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("User with ID {0} not found")]
    NotFound(i64),

    #[error("User with email {0} already exists")]
    EmailTaken(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<sqlx::Error> for UserError {
    fn from(e: sqlx::Error) -> Self {
        UserError::Database(DbError::from(e))
    }
}

/// Canonical form of an email address: trimmed and lowercased.
///
/// Applied before every insert and every comparison so stored values and
/// lookups always agree.
pub fn normalize_email(raw: &str) -> Result<String, UserError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(UserError::InvalidEmail("email cannot be empty".to_string()));
    }
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(UserError::InvalidEmail(format!("'{}' is not an email address", raw.trim())));
    }
    Ok(email)
}
