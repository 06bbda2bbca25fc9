//! SQL access for the `users` table.
//!
//! All functions take the connection of an open transaction; callers own the
//! transaction boundary. Placeholders use `$n`, understood by both supported
//! backends.

use sqlx::AnyConnection;

use super::model::{User, UserRow};

const USER_COLUMNS: &str = "id, email, created_at, updated_at";

/// Insert a user with an already normalized email and return its id.
pub async fn insert(
    conn: &mut AnyConnection,
    email: &str,
    now: i64,
) -> Result<i64, sqlx::Error> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO users (email, created_at, updated_at) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(email)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

pub async fn fetch_by_id(conn: &mut AnyConnection, id: i64) -> Result<Option<User>, sqlx::Error> {
    let row: Option<UserRow> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(row.map(User::from))
}

pub async fn fetch_all(conn: &mut AnyConnection) -> Result<Vec<User>, sqlx::Error> {
    let rows: Vec<UserRow> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(&mut *conn)
            .await?;

    Ok(rows.into_iter().map(User::from).collect())
}

/// Look up by email; `email` must already be normalized.
pub async fn fetch_by_email(
    conn: &mut AnyConnection,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    let row: Option<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = $1"
    ))
    .bind(email)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(User::from))
}
