//! Record store port.
//!
//! The pipeline consumes the store as a generic keyed surface: lookup by
//! uniqueness key (duplicate detection), insert, update, role-scoped read.
//! `SqliteRecordStore` is the production implementation; `MemoryRecordStore`
//! backs the test suite.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use async_trait::async_trait;

use crate::domain::entity::{EntityRecord, EntityType, StoredRecord};
use crate::domain::error::Result;
use crate::domain::import::UniqueKey;

/// Read scope applied by role-aware listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Department(String),
    Owner(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_key(
        &self,
        entity: EntityType,
        key: &UniqueKey,
    ) -> Result<Option<StoredRecord>>;

    async fn get(&self, entity: EntityType, id: i64) -> Result<Option<StoredRecord>>;

    /// Insert a new record, returning its id.
    async fn insert(&self, record: &EntityRecord) -> Result<i64>;

    /// Replace the fields of an existing record in place.
    async fn update(&self, id: i64, record: &EntityRecord) -> Result<()>;

    async fn list(&self, entity: EntityType, scope: &Scope) -> Result<Vec<StoredRecord>>;
}

/// Index columns extracted from a record at write time so key lookups and
/// scoped listings stay SQL-side. Both store implementations share this
/// extraction so their matching semantics cannot drift apart.
#[derive(Debug, Clone, Default)]
pub struct IndexColumns {
    pub key_primary: Option<String>,
    pub key_secondary: Option<String>,
    pub owner_name: Option<String>,
    pub department: Option<String>,
    pub record_date: Option<String>,
}

pub fn index_columns(record: &EntityRecord) -> IndexColumns {
    match record {
        EntityRecord::Course(c) => IndexColumns {
            key_primary: c.code.clone(),
            key_secondary: Some(c.name.clone()),
            ..IndexColumns::default()
        },
        EntityRecord::Expert(e) => IndexColumns {
            key_primary: Some(e.name.clone()),
            ..IndexColumns::default()
        },
        EntityRecord::Customer(c) => IndexColumns {
            key_primary: c.phone.clone(),
            key_secondary: c.email.clone(),
            owner_name: c.owner_name.clone(),
            department: c.department.clone(),
            record_date: c.deal_date.map(|d| d.format("%Y-%m-%d").to_string()),
        },
        EntityRecord::Salesperson(s) => IndexColumns {
            key_primary: s.email.clone(),
            key_secondary: s.phone.clone(),
            owner_name: Some(s.name.clone()),
            department: Some(s.department.clone()),
            record_date: s.hire_date.map(|d| d.format("%Y-%m-%d").to_string()),
        },
        EntityRecord::TrainingSession(t) => IndexColumns {
            key_primary: Some(session_slot_key(&t.course_code, t.start_date)),
            key_secondary: None,
            owner_name: None,
            department: None,
            record_date: Some(t.start_date.format("%Y-%m-%d").to_string()),
        },
    }
}

pub fn session_slot_key(course_code: &str, start_date: chrono::NaiveDate) -> String {
    format!("{}|{}", course_code.trim(), start_date.format("%Y-%m-%d"))
}

/// Which index column a uniqueness key probes, and with what value.
pub enum KeyColumn {
    Primary(String),
    Secondary(String),
}

pub fn key_column(key: &UniqueKey) -> KeyColumn {
    match key {
        UniqueKey::CourseCode { code } => KeyColumn::Primary(code.clone()),
        UniqueKey::CourseName { name } => KeyColumn::Secondary(name.clone()),
        UniqueKey::CustomerPhone { phone } => KeyColumn::Primary(phone.clone()),
        UniqueKey::CustomerEmail { email } => KeyColumn::Secondary(email.clone()),
        UniqueKey::SalespersonEmail { email } => KeyColumn::Primary(email.clone()),
        UniqueKey::SalespersonPhone { phone } => KeyColumn::Secondary(phone.clone()),
        UniqueKey::ExpertName { name } => KeyColumn::Primary(name.clone()),
        UniqueKey::SessionSlot {
            course_code,
            start_date,
        } => KeyColumn::Primary(session_slot_key(course_code, *start_date)),
    }
}

/// In-process scope check. The memory store filters with this directly;
/// the SQLite store narrows with the equivalent WHERE clauses.
pub fn in_scope(record: &EntityRecord, scope: &Scope) -> bool {
    let cols = index_columns(record);
    match scope {
        Scope::All => true,
        Scope::Department(dept) => cols.department.as_deref() == Some(dept.as_str()),
        Scope::Owner(owner) => cols.owner_name.as_deref() == Some(owner.as_str()),
    }
}
