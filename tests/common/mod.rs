//! Shared fixtures for integration tests: throwaway SQLite databases and
//! initialized managers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use coffee_tracker_api::database::{DatabaseManager, PoolConfig};

/// A SQLite database file that lives as long as the returned directory.
pub struct TestDb {
    pub dir: TempDir,
    pub url: String,
}

pub fn temp_db() -> TestDb {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("test.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    TestDb { dir, url }
}

pub fn pool_config(db: &TestDb, pool_size: u32, max_overflow: u32) -> PoolConfig {
    PoolConfig::new(&db.url, false, pool_size, max_overflow)
        .expect("valid pool config")
        .with_acquire_timeout(Duration::from_secs(5))
        .with_drain_timeout(Duration::from_secs(1))
}

/// An isolated manager, already initialized against a fresh database.
pub async fn ready_manager(config: &PoolConfig) -> Arc<DatabaseManager> {
    let manager = Arc::new(DatabaseManager::new());
    manager.initialize(config).await.expect("initialize");
    manager
}
