use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::AdminCredentials;
use crate::store::ReportStore;

/// Startup settings for the delivery server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Published artifacts and force flags.
    pub files_dir: PathBuf,
    /// Report database; `None` keeps it in memory.
    pub db_path: Option<PathBuf>,
    /// Admin routes reject every request when unset.
    pub admin: Option<AdminCredentials>,
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub files_dir: PathBuf,
    pub store: Arc<ReportStore>,
    pub admin: Option<Arc<AdminCredentials>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> updraft_core::Result<Self> {
        updraft_core::io::ensure_dir(&config.files_dir)?;
        let store = match &config.db_path {
            Some(path) => ReportStore::open(path)?,
            None => ReportStore::open_in_memory()?,
        };
        Ok(Self {
            files_dir: config.files_dir,
            store: Arc::new(store),
            admin: config.admin.map(Arc::new),
        })
    }
}
