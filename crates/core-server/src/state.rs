//! Shared application state wired into every HTTP route, the PG-wire
//! listener, and the background jobs.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::locks::TableLockManager;
use crate::paths::PathResolver;
use crate::pgwire_session::PgWireRegistry;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub paths: Arc<PathResolver>,
    pub locks: Arc<TableLockManager>,
    pub config: Arc<Config>,
    pub pgwire_sessions: Arc<PgWireRegistry>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let paths = PathResolver::new(config.storage_core.data_root.clone().into());
        Self {
            db,
            paths: Arc::new(paths),
            locks: Arc::new(TableLockManager::new()),
            config: Arc::new(config),
            pgwire_sessions: Arc::new(PgWireRegistry::new()),
        }
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.storage_core.lock_timeout_secs)
    }
}
