use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of record kinds managed by the console.
///
/// The two performance kinds are aggregation views: they can be exported
/// but have no import schema and no upload template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Courses,
    Experts,
    Customers,
    Salespersons,
    TrainingSessions,
    SalespersonPerformance,
    CourseSalesPerformance,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Courses,
        EntityType::Experts,
        EntityType::Customers,
        EntityType::Salespersons,
        EntityType::TrainingSessions,
        EntityType::SalespersonPerformance,
        EntityType::CourseSalesPerformance,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            EntityType::Courses => "courses",
            EntityType::Experts => "experts",
            EntityType::Customers => "customers",
            EntityType::Salespersons => "salespersons",
            EntityType::TrainingSessions => "training_sessions",
            EntityType::SalespersonPerformance => "salesperson_performance",
            EntityType::CourseSalesPerformance => "course_sales_performance",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EntityType::Courses => "课程",
            EntityType::Experts => "专家",
            EntityType::Customers => "客户",
            EntityType::Salespersons => "销售人员",
            EntityType::TrainingSessions => "培训班期",
            EntityType::SalespersonPerformance => "销售业绩",
            EntityType::CourseSalesPerformance => "课程销售业绩",
        }
    }

    pub fn from_key(key: &str) -> Option<EntityType> {
        EntityType::ALL.iter().copied().find(|e| e.key() == key)
    }

    /// Performance views are computed at export time and cannot be imported.
    pub fn supports_import(&self) -> bool {
        !matches!(
            self,
            EntityType::SalespersonPerformance | EntityType::CourseSalesPerformance
        )
    }
}

/// Caller role used for export scoping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Salesperson,
}

impl Role {
    pub fn from_key(key: &str) -> Option<Role> {
        match key {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "salesperson" => Some(Role::Salesperson),
            _ => None,
        }
    }
}

/// Identity of the caller driving one operation, as asserted by the
/// session gateway. Department is only meaningful for managers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub department: Option<String>,
    pub permissions: Vec<String>,
}

impl Operator {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub code: Option<String>,
    pub name: String,
    pub module: String,
    pub duration_days: i64,
    pub sessions_per_year: i64,
    pub price: Option<f64>,
    pub instructor: Option<String>,
    pub on_shelf: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expert {
    pub name: String,
    pub title: Option<String>,
    pub specialty: Option<String>,
    pub level: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub fee_per_day: Option<f64>,
    pub intro: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub company: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub intent_level: Option<String>,
    pub signed: bool,
    pub deal_amount: Option<f64>,
    pub deal_date: Option<NaiveDate>,
    pub owner_name: Option<String>,
    pub department: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Salesperson {
    pub name: String,
    pub employee_no: Option<String>,
    pub department: String,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub monthly_target: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSession {
    pub course_code: String,
    pub course_name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub expert_name: Option<String>,
    pub capacity: Option<i64>,
    pub enrolled: Option<i64>,
    pub status: Option<String>,
}

/// One typed record, tagged by entity kind.
///
/// The Schema Registry remains the single source of truth for field shape;
/// this enum is the coerced form produced after validation passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "fields", rename_all = "snake_case")]
pub enum EntityRecord {
    Course(Course),
    Expert(Expert),
    Customer(Customer),
    Salesperson(Salesperson),
    TrainingSession(TrainingSession),
}

impl EntityRecord {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityRecord::Course(_) => EntityType::Courses,
            EntityRecord::Expert(_) => EntityType::Experts,
            EntityRecord::Customer(_) => EntityType::Customers,
            EntityRecord::Salesperson(_) => EntityType::Salespersons,
            EntityRecord::TrainingSession(_) => EntityType::TrainingSessions,
        }
    }

    /// String projection of one field, formatted the way exports render it.
    /// Unknown keys yield `None` so the caller can fall back to blank cells.
    pub fn field_text(&self, key: &str) -> Option<String> {
        match self {
            EntityRecord::Course(c) => match key {
                "code" => c.code.clone(),
                "name" => Some(c.name.clone()),
                "module" => Some(c.module.clone()),
                "duration_days" => Some(c.duration_days.to_string()),
                "sessions_per_year" => Some(c.sessions_per_year.to_string()),
                "price" => c.price.map(format_amount),
                "instructor" => c.instructor.clone(),
                "on_shelf" => Some(format_flag(c.on_shelf)),
                "description" => c.description.clone(),
                _ => None,
            },
            EntityRecord::Expert(e) => match key {
                "name" => Some(e.name.clone()),
                "title" => e.title.clone(),
                "specialty" => e.specialty.clone(),
                "level" => e.level.clone(),
                "phone" => e.phone.clone(),
                "email" => e.email.clone(),
                "fee_per_day" => e.fee_per_day.map(format_amount),
                "intro" => e.intro.clone(),
                _ => None,
            },
            EntityRecord::Customer(c) => match key {
                "name" => Some(c.name.clone()),
                "company" => c.company.clone(),
                "position" => c.position.clone(),
                "phone" => c.phone.clone(),
                "email" => c.email.clone(),
                "source" => c.source.clone(),
                "intent_level" => c.intent_level.clone(),
                "signed" => Some(format_flag(c.signed)),
                "deal_amount" => c.deal_amount.map(format_amount),
                "deal_date" => c.deal_date.map(format_date),
                "owner_name" => c.owner_name.clone(),
                "department" => c.department.clone(),
                "remark" => c.remark.clone(),
                _ => None,
            },
            EntityRecord::Salesperson(s) => match key {
                "name" => Some(s.name.clone()),
                "employee_no" => s.employee_no.clone(),
                "department" => Some(s.department.clone()),
                "position" => s.position.clone(),
                "phone" => s.phone.clone(),
                "email" => s.email.clone(),
                "hire_date" => s.hire_date.map(format_date),
                "monthly_target" => s.monthly_target.map(format_amount),
                _ => None,
            },
            EntityRecord::TrainingSession(t) => match key {
                "course_code" => Some(t.course_code.clone()),
                "course_name" => t.course_name.clone(),
                "start_date" => Some(format_date(t.start_date)),
                "end_date" => t.end_date.map(format_date),
                "location" => t.location.clone(),
                "expert_name" => t.expert_name.clone(),
                "capacity" => t.capacity.map(|v| v.to_string()),
                "enrolled" => t.enrolled.map(|v| v.to_string()),
                "status" => t.status.clone(),
                _ => None,
            },
        }
    }
}

/// A record as persisted in the store, with its surrogate id and the
/// insertion timestamp the store stamped on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub record: EntityRecord,
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn format_flag(value: bool) -> String {
    let token = if value { "是" } else { "否" };
    token.to_string()
}

/// Trim a trailing ".0" so whole amounts render as integers in sheets.
pub fn format_amount(value: f64) -> String {
    if (value - value.trunc()).abs() < f64::EPSILON {
        format!("{}", value.trunc() as i64)
    } else {
        format!("{}", value)
    }
}
