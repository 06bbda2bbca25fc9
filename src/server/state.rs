use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::database::DatabaseManager;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub database: Arc<DatabaseManager>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, database: Arc<DatabaseManager>) -> Self {
        Self {
            settings: Arc::new(settings),
            database,
            start_time: Instant::now(),
        }
    }
}
