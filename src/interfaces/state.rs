use std::sync::Arc;

use crate::application::{ExportService, HistoryService, ImportExecutor};

/// Shared services assembled at startup and handed to the HTTP layer.
pub struct AppState {
    pub import_executor: ImportExecutor,
    pub export_service: ExportService,
    pub history: Arc<HistoryService>,
}
