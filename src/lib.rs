pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::application::{ExportService, HistoryService, ImportExecutor, RosterCache};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::Settings;
use crate::infrastructure::db::connection::init_db;
use crate::infrastructure::store::{RecordStore, SqliteRecordStore};
use crate::interfaces::http::{add_log, start_server};
use crate::interfaces::state::AppState;

/// Boot the console backend: settings, database, services, HTTP server.
pub async fn run() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    info!(
        "Initializing database at: {}",
        settings.database_path
    );
    let pool = init_db(Path::new(&settings.database_path)).await?;

    let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(pool.clone()));
    let history = Arc::new(HistoryService::new(pool));
    let roster = Arc::new(RosterCache::new());

    let state = Arc::new(AppState {
        import_executor: ImportExecutor::new(store.clone(), history.clone(), roster.clone()),
        export_service: ExportService::new(store, roster, history.clone()),
        history,
    });

    let logs = Arc::new(Mutex::new(Vec::new()));
    add_log(
        &logs,
        "INFO",
        "System",
        &format!(
            "Backend initialized, listening on {}:{}",
            settings.bind_address, settings.port
        ),
    );

    let server = start_server(state, logs, &settings.bind_address, settings.port)
        .map_err(AppError::from)?;
    info!(
        "traindesk listening on {}:{}",
        settings.bind_address, settings.port
    );

    server.await.map_err(AppError::from)
}
