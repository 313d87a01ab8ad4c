use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One parsed upload row. `row_index` is the 1-based data-row position in
/// the source sheet (the header row is not counted). Values are the raw
/// cell texts keyed by recognized field keys; downstream stages read but
/// never mutate them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRow {
    pub row_index: usize,
    pub values: BTreeMap<String, String>,
}

impl ImportRow {
    pub fn new(row_index: usize) -> Self {
        Self {
            row_index,
            values: BTreeMap::new(),
        }
    }

    /// Trimmed value of a field, with empty cells collapsed to `None`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub row_index: usize,
    pub field_key: String,
    pub severity: Severity,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(row_index: usize, field_key: &str, message: impl Into<String>) -> Self {
        Self {
            row_index,
            field_key: field_key.to_string(),
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(row_index: usize, field_key: &str, message: impl Into<String>) -> Self {
        Self {
            row_index,
            field_key: field_key.to_string(),
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

pub fn has_blocking_issues(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

/// Entity-specific uniqueness key computed from an import row, used to
/// probe the record store for an existing match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UniqueKey {
    CourseCode { code: String },
    CourseName { name: String },
    CustomerPhone { phone: String },
    CustomerEmail { email: String },
    SalespersonEmail { email: String },
    SalespersonPhone { phone: String },
    ExpertName { name: String },
    SessionSlot { course_code: String, start_date: NaiveDate },
}

impl UniqueKey {
    /// Human-readable description shown next to a duplicate candidate.
    pub fn describe(&self) -> String {
        match self {
            UniqueKey::CourseCode { code } => format!("课程编码={}", code),
            UniqueKey::CourseName { name } => format!("课程名称={}", name),
            UniqueKey::CustomerPhone { phone } => format!("联系电话={}", phone),
            UniqueKey::CustomerEmail { email } => format!("邮箱={}", email),
            UniqueKey::SalespersonEmail { email } => format!("邮箱={}", email),
            UniqueKey::SalespersonPhone { phone } => format!("联系电话={}", phone),
            UniqueKey::ExpertName { name } => format!("专家姓名={}", name),
            UniqueKey::SessionSlot {
                course_code,
                start_date,
            } => format!("课程编码={} 开班日期={}", course_code, start_date),
        }
    }
}

/// A validated row that matched an existing record under the entity's
/// uniqueness key. Only rows free of error-severity issues are probed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub row_index: usize,
    pub existing_record_id: i64,
    pub matched_key: String,
}

/// Caller-chosen policy for rows with a duplicate candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStrategy {
    Skip,
    Overwrite,
    KeepBoth,
}

/// Terminal status of one processed row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowStatus {
    Imported,
    Overwritten,
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowOutcome {
    pub row_index: usize,
    pub status: RowStatus,
}

/// Aggregated result of one import operation. Immutable once assembled;
/// `success + failed + skipped` always equals the number of rows submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.success + self.failed + self.skipped
    }
}

/// Import state machine. Terminal states are never re-entered without a
/// fresh file upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Idle,
    Validating,
    ValidationBlocked,
    ValidationPassed,
    Importing,
    Completed,
    PartiallyFailed,
}

impl ImportPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportPhase::Completed | ImportPhase::PartiallyFailed)
    }

    /// Confirmation is only available once validation passed with zero
    /// error-severity issues.
    pub fn can_confirm(&self) -> bool {
        matches!(self, ImportPhase::ValidationPassed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_value_trims_and_drops_empty() {
        let mut row = ImportRow::new(1);
        row.values.insert("name".to_string(), "  张伟  ".to_string());
        row.values.insert("phone".to_string(), "   ".to_string());

        assert_eq!(row.value("name"), Some("张伟"));
        assert_eq!(row.value("phone"), None);
        assert_eq!(row.value("email"), None);
    }

    #[test]
    fn test_blocking_issue_detection() {
        let issues = vec![
            ValidationIssue::warning(1, "module", "off-list value"),
            ValidationIssue::error(2, "name", "required"),
        ];
        assert!(has_blocking_issues(&issues));
        assert!(!has_blocking_issues(&issues[..1]));
    }

    #[test]
    fn test_phase_confirm_gate() {
        assert!(ImportPhase::ValidationPassed.can_confirm());
        assert!(!ImportPhase::ValidationBlocked.can_confirm());
        assert!(!ImportPhase::Importing.can_confirm());
        assert!(ImportPhase::Completed.is_terminal());
        assert!(ImportPhase::PartiallyFailed.is_terminal());
    }
}
