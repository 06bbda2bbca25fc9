//! SQL dialect detection and one-time schema creation.

use sqlx::{AnyConnection, Connection};

use super::DbError;

/// Database backend selected from the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Detect the dialect and return the URL with any `+driver` suffix stripped
    /// from the scheme (`postgresql+asyncpg://` becomes `postgresql://`).
    pub fn from_url(url: &str) -> Result<(Self, String), DbError> {
        let url = url.trim();
        let Some((scheme, rest)) = url.split_once(':') else {
            return Err(DbError::Config(format!("missing URL scheme in '{url}'")));
        };
        let base = scheme.split('+').next().unwrap_or(scheme).to_ascii_lowercase();

        let dialect = match base.as_str() {
            "postgres" | "postgresql" => Dialect::Postgres,
            "sqlite" => Dialect::Sqlite,
            other => {
                return Err(DbError::Config(format!(
                    "unsupported database scheme '{other}'"
                )))
            }
        };

        Ok((dialect, format!("{base}:{rest}")))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }

    fn users_table_ddl(&self) -> &'static str {
        match self {
            Dialect::Postgres => {
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id BIGSERIAL PRIMARY KEY,
                    email TEXT NOT NULL UNIQUE,
                    created_at BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL
                )
                "#
            }
            Dialect::Sqlite => {
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL UNIQUE,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )
                "#
            }
        }
    }
}

/// Create all tables that do not exist yet, in a single transaction.
pub async fn create_schema(conn: &mut AnyConnection, dialect: Dialect) -> Result<(), DbError> {
    let mut tx = conn.begin().await?;
    sqlx::query(dialect.users_table_ddl())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::debug!(dialect = dialect.as_str(), "Schema ensured");
    Ok(())
}
