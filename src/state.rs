use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Database;
use crate::middleware::SessionStore;

/// The shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The database handle, holding the long-lived Postgres pool.
    pub db: Database,
    /// The validated configuration. Never mutated after startup.
    pub config: Arc<AppConfig>,
    /// Server-side session storage.
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        Self { db, config: Arc::new(config), sessions: SessionStore::default() }
    }
}
