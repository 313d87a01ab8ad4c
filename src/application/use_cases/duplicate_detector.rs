//! Duplicate detector.
//!
//! Each entity defines its own uniqueness key (explicit strategy selected
//! by the EntityType tag). Rows free of error-severity issues are probed
//! against the record store; a match becomes a [`DuplicateCandidate`] for
//! the strategy chosen at confirmation time. Rows whose key cannot be
//! computed proceed as "new" with a warning, never silently skipped.

use std::collections::HashSet;

use crate::application::use_cases::row_validator::parse_date;
use crate::domain::entity::EntityType;
use crate::domain::error::Result;
use crate::domain::import::{
    DuplicateCandidate, ImportRow, Severity, UniqueKey, ValidationIssue,
};
use crate::infrastructure::store::RecordStore;

#[derive(Debug, Default)]
pub struct DetectOutcome {
    pub candidates: Vec<DuplicateCandidate>,
    pub notes: Vec<ValidationIssue>,
}

/// Uniqueness key of one row, or `None` when the identifying fields are
/// absent or unparseable.
pub fn unique_key_of(entity: EntityType, row: &ImportRow) -> Option<UniqueKey> {
    match entity {
        EntityType::Courses => {
            if let Some(code) = row.value("code") {
                Some(UniqueKey::CourseCode {
                    code: code.to_string(),
                })
            } else {
                row.value("name").map(|name| UniqueKey::CourseName {
                    name: name.to_string(),
                })
            }
        }
        EntityType::Customers => {
            if let Some(phone) = row.value("phone") {
                Some(UniqueKey::CustomerPhone {
                    phone: phone.to_string(),
                })
            } else {
                row.value("email").map(|email| UniqueKey::CustomerEmail {
                    email: email.to_string(),
                })
            }
        }
        EntityType::Salespersons => {
            if let Some(email) = row.value("email") {
                Some(UniqueKey::SalespersonEmail {
                    email: email.to_string(),
                })
            } else {
                row.value("phone").map(|phone| UniqueKey::SalespersonPhone {
                    phone: phone.to_string(),
                })
            }
        }
        EntityType::Experts => row.value("name").map(|name| UniqueKey::ExpertName {
            name: name.to_string(),
        }),
        EntityType::TrainingSessions => {
            let course_code = row.value("course_code")?;
            let start_date = row.value("start_date").and_then(parse_date)?;
            Some(UniqueKey::SessionSlot {
                course_code: course_code.to_string(),
                start_date,
            })
        }
        EntityType::SalespersonPerformance | EntityType::CourseSalesPerformance => None,
    }
}

pub async fn detect(
    store: &dyn RecordStore,
    entity: EntityType,
    rows: &[ImportRow],
    issues: &[ValidationIssue],
) -> Result<DetectOutcome> {
    let blocked_rows: HashSet<usize> = issues
        .iter()
        .filter(|i| i.severity == Severity::Error)
        .map(|i| i.row_index)
        .collect();

    let mut outcome = DetectOutcome::default();

    for row in rows {
        if blocked_rows.contains(&row.row_index) {
            continue;
        }

        let key = match unique_key_of(entity, row) {
            Some(key) => key,
            None => {
                outcome.notes.push(ValidationIssue::warning(
                    row.row_index,
                    "",
                    "缺少可识别的唯一键, 按新记录处理".to_string(),
                ));
                continue;
            }
        };

        if let Some(existing) = store.find_by_key(entity, &key).await? {
            outcome.candidates.push(DuplicateCandidate {
                row_index: row.row_index,
                existing_record_id: existing.id,
                matched_key: key.describe(),
            });
        }
    }

    Ok(outcome)
}
