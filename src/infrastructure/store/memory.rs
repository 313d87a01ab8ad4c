use std::sync::Mutex;

use chrono::Utc;

use super::{in_scope, index_columns, key_column, KeyColumn, RecordStore, Scope};
use crate::domain::entity::{EntityRecord, EntityType, StoredRecord};
use crate::domain::error::{AppError, Result};
use crate::domain::import::UniqueKey;

/// In-memory record store sharing the SQLite implementation's key/scope
/// semantics. Backs the test suite and local experiments.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: Vec<StoredRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matches_key(record: &EntityRecord, key: &UniqueKey) -> bool {
    let cols = index_columns(record);
    match key_column(key) {
        KeyColumn::Primary(value) => cols.key_primary.as_deref() == Some(value.as_str()),
        KeyColumn::Secondary(value) => cols.key_secondary.as_deref() == Some(value.as_str()),
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_by_key(
        &self,
        entity: EntityType,
        key: &UniqueKey,
    ) -> Result<Option<StoredRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rows
            .iter()
            .find(|r| r.record.entity_type() == entity && matches_key(&r.record, key))
            .cloned())
    }

    async fn get(&self, entity: EntityType, id: i64) -> Result<Option<StoredRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rows
            .iter()
            .find(|r| r.record.entity_type() == entity && r.id == id)
            .cloned())
    }

    async fn insert(&self, record: &EntityRecord) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push(StoredRecord {
            id,
            created_at: Utc::now(),
            record: record.clone(),
        });
        Ok(id)
    }

    async fn update(&self, id: i64, record: &EntityRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let slot = inner
            .rows
            .iter_mut()
            .find(|r| r.id == id && r.record.entity_type() == record.entity_type())
            .ok_or_else(|| AppError::NotFound(format!("Record {} not found for update", id)))?;
        slot.record = record.clone();
        Ok(())
    }

    async fn list(&self, entity: EntityType, scope: &Scope) -> Result<Vec<StoredRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rows
            .iter()
            .filter(|r| r.record.entity_type() == entity && in_scope(&r.record, scope))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::Expert;

    fn expert(name: &str) -> EntityRecord {
        EntityRecord::Expert(Expert {
            name: name.to_string(),
            title: None,
            specialty: None,
            level: None,
            phone: None,
            email: None,
            fee_per_day: None,
            intro: None,
        })
    }

    #[tokio::test]
    async fn test_find_by_expert_name() {
        let store = MemoryRecordStore::new();
        let id = store.insert(&expert("陈教授")).await.unwrap();

        let found = store
            .find_by_key(
                EntityType::Experts,
                &UniqueKey::ExpertName {
                    name: "陈教授".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(found.map(|r| r.id), Some(id));

        let missing = store
            .find_by_key(
                EntityType::Experts,
                &UniqueKey::ExpertName {
                    name: "不存在".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
