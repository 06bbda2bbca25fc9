//! User endpoints.
//!
//! Extractor rejections are taken as `Result` so malformed input gets the
//! same JSON error body as every other failure.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::domain::user::{CreateUserRequest, User, UserService};
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub email: Option<String>,
}

/// GET /api/v1/users - List users, optionally filtered by email
pub async fn list_users(
    query: std::result::Result<Query<ListUsersQuery>, QueryRejection>,
) -> Result<Json<Vec<User>>> {
    let Query(query) = query?;
    let service = UserService::new();

    let users = match query.email {
        Some(email) => service.find_by_email(&email).await?.into_iter().collect(),
        None => service.list_users().await?,
    };

    Ok(Json(users))
}

/// GET /api/v1/users/{id} - Get a single user
pub async fn get_user(
    id: std::result::Result<Path<i64>, PathRejection>,
) -> Result<Json<User>> {
    let Path(id) = id?;
    let user = UserService::new().get_user(id).await?;
    Ok(Json(user))
}

/// POST /api/v1/users - Create a user
pub async fn create_user(
    request: std::result::Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>)> {
    let Json(request) = request?;
    let email = request
        .email
        .ok_or_else(|| AppError::Validation("email is required".to_string()))?;

    let user = UserService::new().create_user(&email).await?;
    Ok((StatusCode::CREATED, Json(user)))
}
