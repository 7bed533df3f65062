use std::sync::Arc;

use jotter_db::{Database, StorageBackend};

use crate::config::ApiConfig;

/// Shared handler state; cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub storage: Arc<dyn StorageBackend>,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(db: Database, storage: Arc<dyn StorageBackend>, config: ApiConfig) -> Self {
        Self {
            db,
            storage,
            config: Arc::new(config),
        }
    }
}
