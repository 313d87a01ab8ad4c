use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Import,
    Export,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Import => "import",
            OperationType::Export => "export",
        }
    }

    pub fn from_key(key: &str) -> Option<OperationType> {
        match key {
            "import" => Some(OperationType::Import),
            "export" => Some(OperationType::Export),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    Partial,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Success => "success",
            OperationStatus::Partial => "partial",
        }
    }

    pub fn from_key(key: &str) -> Option<OperationStatus> {
        match key {
            "success" => Some(OperationStatus::Success),
            "partial" => Some(OperationStatus::Partial),
            _ => None,
        }
    }
}

/// Audit entry for one completed import or export. Written once per
/// operation and never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationEntry {
    pub operation_type: OperationType,
    pub data_type: String,
    pub operator_id: String,
    pub operator_name: String,
    pub record_count: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub skipped_count: i64,
    pub status: OperationStatus,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub duration_ms: i64,
}

/// Audit entry as stored, with its id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: i64,
    pub operation_type: OperationType,
    pub data_type: String,
    pub operator_id: String,
    pub operator_name: String,
    pub timestamp: DateTime<Utc>,
    pub record_count: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub skipped_count: i64,
    pub status: OperationStatus,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub duration_ms: i64,
}
