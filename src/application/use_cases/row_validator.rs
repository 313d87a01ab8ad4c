//! Row validator.
//!
//! Applies the Schema Registry's per-field rules to parsed rows, producing
//! classified issues. Precedence per field:
//! 1. required + empty -> error
//! 2. type-incompatible -> error
//! 3. off-list enumerated value -> warning (error when the field is required)
//! 4. cross-field roster lookups -> warning
//!
//! Every row is fully checked even after the first error so the UI can show
//! all problems before a re-upload.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::application::use_cases::roster_cache::RosterSnapshot;
use crate::application::use_cases::schema_registry::{import_fields_for, FieldDefinition, FieldKind};
use crate::domain::entity::{
    Course, Customer, EntityRecord, EntityType, Expert, Salesperson, TrainingSession,
};
use crate::domain::error::{AppError, Result};
use crate::domain::import::{ImportRow, ValidationIssue};

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9\-\s]{5,19}$").expect("valid phone regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

pub fn validate(
    entity: EntityType,
    rows: &[ImportRow],
    roster: &RosterSnapshot,
) -> Vec<ValidationIssue> {
    let fields = import_fields_for(entity);
    let mut issues = Vec::new();

    for row in rows {
        for field in fields {
            check_field(row, field, &mut issues);
        }
        check_references(entity, row, roster, &mut issues);
    }

    issues
}

fn check_field(row: &ImportRow, field: &FieldDefinition, issues: &mut Vec<ValidationIssue>) {
    let raw = match row.value(field.key) {
        Some(raw) => raw,
        None => {
            if field.required {
                issues.push(ValidationIssue::error(
                    row.row_index,
                    field.key,
                    format!("「{}」为必填项", field.label),
                ));
            }
            return;
        }
    };

    match field.kind {
        FieldKind::Text => {}
        FieldKind::Integer => {
            if parse_integer(raw).is_none() {
                issues.push(ValidationIssue::error(
                    row.row_index,
                    field.key,
                    format!("「{}」需为整数, 当前值 \"{}\"", field.label, raw),
                ));
            }
        }
        FieldKind::Decimal => {
            if parse_decimal(raw).is_none() {
                issues.push(ValidationIssue::error(
                    row.row_index,
                    field.key,
                    format!("「{}」需为数字, 当前值 \"{}\"", field.label, raw),
                ));
            }
        }
        FieldKind::Date => {
            if parse_date(raw).is_none() {
                issues.push(ValidationIssue::error(
                    row.row_index,
                    field.key,
                    format!("「{}」日期格式无效, 当前值 \"{}\"", field.label, raw),
                ));
            }
        }
        FieldKind::Bool => {
            if parse_flag(raw).is_none() {
                push_off_list(row, field, raw, issues);
            }
        }
        FieldKind::Enum => {
            if !field.options.contains(&raw) {
                push_off_list(row, field, raw, issues);
            }
        }
    }
}

// Off-list enumerated values stay warnings unless the field is required.
fn push_off_list(
    row: &ImportRow,
    field: &FieldDefinition,
    raw: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let message = format!(
        "「{}」值 \"{}\" 不在可选范围 [{}]",
        field.label,
        raw,
        field.options.join("/")
    );
    if field.required {
        issues.push(ValidationIssue::error(row.row_index, field.key, message));
    } else {
        issues.push(ValidationIssue::warning(row.row_index, field.key, message));
    }
}

/// Cross-field and roster checks. These stay warnings: the reference may
/// resolve later or be left unassigned.
fn check_references(
    entity: EntityType,
    row: &ImportRow,
    roster: &RosterSnapshot,
    issues: &mut Vec<ValidationIssue>,
) {
    match entity {
        EntityType::Courses => {
            if let Some(instructor) = row.value("instructor") {
                if !roster.has_expert(instructor) {
                    issues.push(ValidationIssue::warning(
                        row.row_index,
                        "instructor",
                        format!("授课专家 \"{}\" 不在专家名录中", instructor),
                    ));
                }
            }
        }
        EntityType::Customers => {
            if let Some(owner) = row.value("owner_name") {
                if !roster.has_salesperson(owner) {
                    issues.push(ValidationIssue::warning(
                        row.row_index,
                        "owner_name",
                        format!("负责销售 \"{}\" 不在销售名录中", owner),
                    ));
                }
            }
            if let Some(department) = row.value("department") {
                if !roster.has_department(department) {
                    issues.push(ValidationIssue::warning(
                        row.row_index,
                        "department",
                        format!("部门 \"{}\" 不在部门名录中", department),
                    ));
                }
            }
            check_contact_formats(row, issues);
        }
        EntityType::Salespersons => {
            check_contact_formats(row, issues);
        }
        EntityType::Experts => {
            check_contact_formats(row, issues);
        }
        EntityType::TrainingSessions => {
            if let Some(code) = row.value("course_code") {
                if !roster.has_course_code(code) {
                    issues.push(ValidationIssue::warning(
                        row.row_index,
                        "course_code",
                        format!("课程编码 \"{}\" 不在课程名录中", code),
                    ));
                }
            }
            if let Some(expert) = row.value("expert_name") {
                if !roster.has_expert(expert) {
                    issues.push(ValidationIssue::warning(
                        row.row_index,
                        "expert_name",
                        format!("授课专家 \"{}\" 不在专家名录中", expert),
                    ));
                }
            }
            if let (Some(start), Some(end)) = (
                row.value("start_date").and_then(parse_date),
                row.value("end_date").and_then(parse_date),
            ) {
                if end < start {
                    issues.push(ValidationIssue::warning(
                        row.row_index,
                        "end_date",
                        "结课日期早于开班日期".to_string(),
                    ));
                }
            }
        }
        EntityType::SalespersonPerformance | EntityType::CourseSalesPerformance => {}
    }
}

fn check_contact_formats(row: &ImportRow, issues: &mut Vec<ValidationIssue>) {
    if let Some(phone) = row.value("phone") {
        if !PHONE_RE.is_match(phone) {
            issues.push(ValidationIssue::warning(
                row.row_index,
                "phone",
                format!("联系电话 \"{}\" 格式可能有误", phone),
            ));
        }
    }
    if let Some(email) = row.value("email") {
        if !EMAIL_RE.is_match(email) {
            issues.push(ValidationIssue::warning(
                row.row_index,
                "email",
                format!("邮箱 \"{}\" 格式可能有误", email),
            ));
        }
    }
}

pub fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    // Excel renders integer cells as floats ("3.0").
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.fract() == 0.0 && v.is_finite())
        .map(|v| v as i64)
}

pub fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim()
        .trim_start_matches(['¥', '￥'])
        .replace(',', "")
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日", "%Y.%m.%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    // Datetime cells keep their time part when formatted as text.
    NaiveDate::parse_from_str(raw.split_whitespace().next()?, "%Y-%m-%d").ok()
}

/// Coerce a 是/否-family token. `None` means the token is off-list and the
/// validator has already reported it; record builders fall back to `false`.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "是" | "true" | "1" | "y" | "yes" => Some(true),
        "否" | "false" | "0" | "n" | "no" => Some(false),
        _ => None,
    }
}

/// Build the typed record for a validated row. Callers run this only after
/// [`validate`] reports no error-severity issues for the row; a missing
/// required field here still surfaces as a `ValidationError` rather than a
/// panic.
pub fn build_record(entity: EntityType, row: &ImportRow) -> Result<EntityRecord> {
    let required = |key: &str| -> Result<String> {
        row.value(key).map(|v| v.to_string()).ok_or_else(|| {
            AppError::ValidationError(format!("第 {} 行缺少必填字段 {}", row.row_index, key))
        })
    };
    let optional = |key: &str| row.value(key).map(|v| v.to_string());

    let record = match entity {
        EntityType::Courses => EntityRecord::Course(Course {
            code: optional("code"),
            name: required("name")?,
            module: required("module")?,
            duration_days: required("duration_days").map(|v| parse_integer(&v))?.ok_or_else(
                || AppError::ValidationError(format!("第 {} 行学制天数无效", row.row_index)),
            )?,
            sessions_per_year: required("sessions_per_year")
                .map(|v| parse_integer(&v))?
                .ok_or_else(|| {
                    AppError::ValidationError(format!("第 {} 行年开班次数无效", row.row_index))
                })?,
            price: optional("price").and_then(|v| parse_decimal(&v)),
            instructor: optional("instructor"),
            on_shelf: optional("on_shelf")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(false),
            description: optional("description"),
        }),
        EntityType::Experts => EntityRecord::Expert(Expert {
            name: required("name")?,
            title: optional("title"),
            specialty: optional("specialty"),
            level: optional("level"),
            phone: optional("phone"),
            email: optional("email"),
            fee_per_day: optional("fee_per_day").and_then(|v| parse_decimal(&v)),
            intro: optional("intro"),
        }),
        EntityType::Customers => EntityRecord::Customer(Customer {
            name: required("name")?,
            company: optional("company"),
            position: optional("position"),
            phone: optional("phone"),
            email: optional("email"),
            source: optional("source"),
            intent_level: optional("intent_level"),
            signed: optional("signed")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(false),
            deal_amount: optional("deal_amount").and_then(|v| parse_decimal(&v)),
            deal_date: optional("deal_date").and_then(|v| parse_date(&v)),
            owner_name: optional("owner_name"),
            department: optional("department"),
            remark: optional("remark"),
        }),
        EntityType::Salespersons => EntityRecord::Salesperson(Salesperson {
            name: required("name")?,
            employee_no: optional("employee_no"),
            department: required("department")?,
            position: optional("position"),
            phone: optional("phone"),
            email: optional("email"),
            hire_date: optional("hire_date").and_then(|v| parse_date(&v)),
            monthly_target: optional("monthly_target").and_then(|v| parse_decimal(&v)),
        }),
        EntityType::TrainingSessions => EntityRecord::TrainingSession(TrainingSession {
            course_code: required("course_code")?,
            course_name: optional("course_name"),
            start_date: required("start_date").map(|v| parse_date(&v))?.ok_or_else(|| {
                AppError::ValidationError(format!("第 {} 行开班日期无效", row.row_index))
            })?,
            end_date: optional("end_date").and_then(|v| parse_date(&v)),
            location: optional("location"),
            expert_name: optional("expert_name"),
            capacity: optional("capacity").and_then(|v| parse_integer(&v)),
            enrolled: optional("enrolled").and_then(|v| parse_integer(&v)),
            status: optional("status"),
        }),
        EntityType::SalespersonPerformance | EntityType::CourseSalesPerformance => {
            return Err(AppError::ValidationError(format!(
                "{} 不支持导入",
                entity.display_name()
            )))
        }
    };

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import::{has_blocking_issues, Severity};
    use std::collections::BTreeMap;

    fn course_row(index: usize, pairs: &[(&str, &str)]) -> ImportRow {
        let mut values = BTreeMap::new();
        for (k, v) in pairs {
            values.insert(k.to_string(), v.to_string());
        }
        ImportRow {
            row_index: index,
            values,
        }
    }

    fn valid_course(index: usize, name: &str) -> ImportRow {
        course_row(
            index,
            &[
                ("name", name),
                ("module", "领导力"),
                ("duration_days", "3"),
                ("sessions_per_year", "6"),
            ],
        )
    }

    #[test]
    fn test_complete_rows_have_no_errors() {
        let rows = vec![
            valid_course(1, "高管领导力"),
            valid_course(2, "目标管理"),
            valid_course(3, "沟通技巧"),
        ];
        let issues = validate(EntityType::Courses, &rows, &RosterSnapshot::default());
        assert!(!has_blocking_issues(&issues), "{:?}", issues);
    }

    #[test]
    fn test_missing_required_name_blocks() {
        let rows = vec![course_row(
            1,
            &[
                ("module", "领导力"),
                ("duration_days", "3"),
                ("sessions_per_year", "6"),
            ],
        )];
        let issues = validate(EntityType::Courses, &rows, &RosterSnapshot::default());

        let errors: Vec<_> = issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row_index, 1);
        assert_eq!(errors[0].field_key, "name");
    }

    #[test]
    fn test_type_incompatible_is_error() {
        let rows = vec![course_row(
            1,
            &[
                ("name", "高管领导力"),
                ("module", "领导力"),
                ("duration_days", "三天"),
                ("sessions_per_year", "6"),
            ],
        )];
        let issues = validate(EntityType::Courses, &rows, &RosterSnapshot::default());
        assert!(issues
            .iter()
            .any(|i| i.severity == Severity::Error && i.field_key == "duration_days"));
    }

    #[test]
    fn test_off_list_enum_warns_but_required_escalates() {
        // module is required -> off-list escalates to error.
        let rows = vec![course_row(
            1,
            &[
                ("name", "课程A"),
                ("module", "神秘模块"),
                ("duration_days", "1"),
                ("sessions_per_year", "2"),
            ],
        )];
        let issues = validate(EntityType::Courses, &rows, &RosterSnapshot::default());
        assert!(issues
            .iter()
            .any(|i| i.severity == Severity::Error && i.field_key == "module"));

        // on_shelf is optional -> off-list stays a warning.
        let mut row = valid_course(1, "课程B");
        row.values
            .insert("on_shelf".to_string(), "也许".to_string());
        let issues = validate(EntityType::Courses, &[row], &RosterSnapshot::default());
        let on_shelf: Vec<_> = issues.iter().filter(|i| i.field_key == "on_shelf").collect();
        assert_eq!(on_shelf.len(), 1);
        assert_eq!(on_shelf[0].severity, Severity::Warning);
    }

    #[test]
    fn test_roster_lookup_miss_is_warning_only() {
        let mut row = valid_course(1, "课程C");
        row.values
            .insert("instructor".to_string(), "陌生专家".to_string());
        let issues = validate(EntityType::Courses, &[row], &RosterSnapshot::default());

        assert!(!has_blocking_issues(&issues));
        assert!(issues
            .iter()
            .any(|i| i.field_key == "instructor" && i.severity == Severity::Warning));
    }

    #[test]
    fn test_every_row_fully_checked_after_first_error() {
        let rows = vec![
            course_row(1, &[("module", "领导力")]),
            course_row(2, &[("module", "领导力")]),
        ];
        let issues = validate(EntityType::Courses, &rows, &RosterSnapshot::default());

        // name, duration_days, sessions_per_year missing on both rows.
        let row1: Vec<_> = issues.iter().filter(|i| i.row_index == 1).collect();
        let row2: Vec<_> = issues.iter().filter(|i| i.row_index == 2).collect();
        assert_eq!(row1.len(), 3);
        assert_eq!(row2.len(), 3);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_integer("3"), Some(3));
        assert_eq!(parse_integer("3.0"), Some(3));
        assert_eq!(parse_integer("3.5"), None);
        assert_eq!(parse_decimal("¥12,800"), Some(12800.0));
        assert_eq!(
            parse_date("2026/03/01"),
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        assert_eq!(
            parse_date("2026年3月1日"),
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        assert_eq!(parse_flag("是"), Some(true));
        assert_eq!(parse_flag("否"), Some(false));
        assert_eq!(parse_flag("也许"), None);
    }

    #[test]
    fn test_build_record_coerces_values() {
        let mut row = valid_course(1, "高管领导力");
        row.values.insert("price".to_string(), "12800".to_string());
        row.values.insert("on_shelf".to_string(), "是".to_string());

        let record = build_record(EntityType::Courses, &row).unwrap();
        match record {
            EntityRecord::Course(course) => {
                assert_eq!(course.name, "高管领导力");
                assert_eq!(course.duration_days, 3);
                assert_eq!(course.price, Some(12800.0));
                assert!(course.on_shelf);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }
}
