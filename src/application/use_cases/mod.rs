pub mod codec;
pub mod duplicate_detector;
pub mod export_selector;
pub mod history_service;
pub mod import_executor;
pub mod roster_cache;
pub mod row_validator;
pub mod schema_registry;
pub mod template_generator;
