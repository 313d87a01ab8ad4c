//! Runtime configuration.
//!
//! Pipeline limits are fixed constants, not user-editable at runtime.
//! Deployment settings (database path, bind address) come from an optional
//! `traindesk.toml` overlaid with `TRAINDESK_`-prefixed env vars.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::error::{AppError, Result};

/// Reject oversized files before parse.
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;
/// Reject parse beyond this row count.
pub const MAX_IMPORT_RECORDS: usize = 50_000;
/// Rows per commit batch.
pub const BATCH_SIZE: usize = 1_000;
/// Rows shown in the UI preview.
pub const PREVIEW_LIMIT: usize = 50;
/// History entries shown per page.
pub const HISTORY_LIMIT: usize = 20;
/// Audit retention window in days.
pub const HISTORY_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database_path: String,
    pub bind_address: String,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: "traindesk.db".to_string(),
            bind_address: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Settings> {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("traindesk.toml"))
            .merge(Env::prefixed("TRAINDESK_"))
            .extract()
            .map_err(|e| AppError::Internal(format!("Failed to load settings: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_local() {
        let settings = Settings::default();
        assert_eq!(settings.bind_address, "127.0.0.1");
        assert_eq!(settings.port, 3001);
    }

    #[test]
    fn test_limits_are_consistent() {
        assert!(BATCH_SIZE <= MAX_IMPORT_RECORDS);
        assert!(PREVIEW_LIMIT <= BATCH_SIZE);
    }
}
