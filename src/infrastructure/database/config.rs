//! Validated connection pool configuration.

use std::time::Duration;

use crate::config::DatabaseConfig;

use super::schema::Dialect;
use super::DbError;

/// Pool configuration, validated at construction.
///
/// `pool_size` connections are kept as the baseline and up to
/// `pool_size + max_overflow` may be borrowed concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    url: String,
    dialect: Dialect,
    echo: bool,
    pool_size: u32,
    max_overflow: u32,
    acquire_timeout: Duration,
    idle_timeout: Duration,
    drain_timeout: Duration,
}

impl PoolConfig {
    /// Build a pool configuration with default timeouts.
    pub fn new(
        url: impl Into<String>,
        echo: bool,
        pool_size: u32,
        max_overflow: u32,
    ) -> Result<Self, DbError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(DbError::Config("database URL cannot be empty".to_string()));
        }
        if pool_size < 1 {
            return Err(DbError::Config("pool size must be at least 1".to_string()));
        }
        if pool_size.checked_add(max_overflow).is_none() {
            return Err(DbError::Config(format!(
                "pool size {pool_size} plus max overflow {max_overflow} is too large"
            )));
        }

        let (dialect, url) = Dialect::from_url(&url)?;

        Ok(Self {
            url,
            dialect,
            echo,
            pool_size,
            max_overflow,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            drain_timeout: Duration::from_secs(10),
        })
    }

    /// Build from the `database` section of the settings.
    pub fn from_settings(config: &DatabaseConfig) -> Result<Self, DbError> {
        Ok(Self::new(&config.url, config.echo, config.pool_size, config.max_overflow)?
            .with_acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
            .with_idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .with_drain_timeout(Duration::from_secs(config.drain_timeout_seconds)))
    }

    /// Maximum time a borrower waits for a pooled connection.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Idle time after which surplus connections are closed.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Maximum time `dispose` waits for checked-out connections.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn echo(&self) -> bool {
        self.echo
    }

    pub fn pool_size(&self) -> u32 {
        self.pool_size
    }

    pub fn max_overflow(&self) -> u32 {
        self.max_overflow
    }

    /// Upper bound on concurrently borrowed connections.
    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Get the database URL with the password masked for logging.
    pub fn url_masked(&self) -> String {
        if let Some(at_pos) = self.url.find('@') {
            if let Some(colon_pos) = self.url[..at_pos].rfind(':') {
                // "scheme://host" has no credentials to hide
                if !self.url[colon_pos..at_pos].starts_with("://") {
                    let prefix = &self.url[..colon_pos + 1];
                    let suffix = &self.url[at_pos..];
                    return format!("{}***{}", prefix, suffix);
                }
            }
        }
        self.url.clone()
    }
}
