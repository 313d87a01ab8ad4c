pub mod use_cases;

pub use use_cases::export_selector::ExportService;
pub use use_cases::history_service::HistoryService;
pub use use_cases::import_executor::ImportExecutor;
pub use use_cases::roster_cache::RosterCache;
