use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{index_columns, key_column, KeyColumn, RecordStore, Scope};
use crate::domain::entity::{EntityRecord, EntityType, StoredRecord};
use crate::domain::error::{AppError, Result};
use crate::domain::import::UniqueKey;

/// Production record store backed by the `records` table: typed payload as
/// JSON plus extracted index columns for key lookups and scoped listings.
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

type RecordRow = (i64, String, String);

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn hydrate(row: RecordRow) -> Result<StoredRecord> {
        let (id, data_json, created_at) = row;
        let record: EntityRecord = serde_json::from_str(&data_json).map_err(|e| {
            AppError::DatabaseError(format!("Corrupt record payload for id {}: {}", id, e))
        })?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| {
                AppError::DatabaseError(format!("Corrupt timestamp for id {}: {}", id, e))
            })?;
        Ok(StoredRecord {
            id,
            created_at,
            record,
        })
    }
}

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    async fn find_by_key(
        &self,
        entity: EntityType,
        key: &UniqueKey,
    ) -> Result<Option<StoredRecord>> {
        let (column, value) = match key_column(key) {
            KeyColumn::Primary(value) => ("key_primary", value),
            KeyColumn::Secondary(value) => ("key_secondary", value),
        };

        let sql = format!(
            "SELECT id, data_json, created_at FROM records \
             WHERE entity_type = ? AND {} = ? ORDER BY id ASC LIMIT 1",
            column
        );

        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(entity.key())
            .bind(&value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to look up record: {}", e)))?;

        row.map(Self::hydrate).transpose()
    }

    async fn get(&self, entity: EntityType, id: i64) -> Result<Option<StoredRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT id, data_json, created_at FROM records WHERE entity_type = ? AND id = ?",
        )
        .bind(entity.key())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch record {}: {}", id, e)))?;

        row.map(Self::hydrate).transpose()
    }

    async fn insert(&self, record: &EntityRecord) -> Result<i64> {
        let cols = index_columns(record);
        let data_json = serde_json::to_string(record)
            .map_err(|e| AppError::Internal(format!("Failed to serialize record: {}", e)))?;

        let result = sqlx::query(
            "INSERT INTO records (\
                entity_type, key_primary, key_secondary, owner_name, department, \
                record_date, data_json, created_at\
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.entity_type().key())
        .bind(&cols.key_primary)
        .bind(&cols.key_secondary)
        .bind(&cols.owner_name)
        .bind(&cols.department)
        .bind(&cols.record_date)
        .bind(&data_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert record: {}", e)))?;

        Ok(result.last_insert_rowid())
    }

    async fn update(&self, id: i64, record: &EntityRecord) -> Result<()> {
        let cols = index_columns(record);
        let data_json = serde_json::to_string(record)
            .map_err(|e| AppError::Internal(format!("Failed to serialize record: {}", e)))?;

        let result = sqlx::query(
            "UPDATE records SET \
                key_primary = ?, key_secondary = ?, owner_name = ?, department = ?, \
                record_date = ?, data_json = ?, updated_at = ? \
             WHERE id = ? AND entity_type = ?",
        )
        .bind(&cols.key_primary)
        .bind(&cols.key_secondary)
        .bind(&cols.owner_name)
        .bind(&cols.department)
        .bind(&cols.record_date)
        .bind(&data_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .bind(record.entity_type().key())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update record {}: {}", id, e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Record {} not found for update",
                id
            )));
        }
        Ok(())
    }

    async fn list(&self, entity: EntityType, scope: &Scope) -> Result<Vec<StoredRecord>> {
        let mut sql = String::from(
            "SELECT id, data_json, created_at FROM records WHERE entity_type = ?",
        );
        match scope {
            Scope::All => {}
            Scope::Department(_) => sql.push_str(" AND department = ?"),
            Scope::Owner(_) => sql.push_str(" AND owner_name = ?"),
        }
        sql.push_str(" ORDER BY id ASC");

        let mut query = sqlx::query_as::<_, RecordRow>(&sql).bind(entity.key());
        match scope {
            Scope::All => {}
            Scope::Department(dept) => query = query.bind(dept),
            Scope::Owner(owner) => query = query.bind(owner),
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list records: {}", e)))?;

        rows.into_iter().map(Self::hydrate).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::Customer;
    use crate::infrastructure::db::connection::connect_memory;

    fn customer(name: &str, phone: &str, owner: &str) -> EntityRecord {
        EntityRecord::Customer(Customer {
            name: name.to_string(),
            company: None,
            position: None,
            phone: Some(phone.to_string()),
            email: None,
            source: None,
            intent_level: None,
            signed: false,
            deal_amount: None,
            deal_date: None,
            owner_name: Some(owner.to_string()),
            department: Some("销售一部".to_string()),
            remark: None,
        })
    }

    #[tokio::test]
    async fn test_insert_find_update_round_trip() {
        let pool = connect_memory().await.unwrap();
        let store = SqliteRecordStore::new(pool);

        let record = customer("王芳", "13800138000", "张伟");
        let id = store.insert(&record).await.unwrap();

        let found = store
            .find_by_key(
                EntityType::Customers,
                &UniqueKey::CustomerPhone {
                    phone: "13800138000".to_string(),
                },
            )
            .await
            .unwrap()
            .expect("inserted record should be found by phone");
        assert_eq!(found.id, id);
        assert_eq!(found.record, record);

        let updated = customer("王芳", "13800138000", "李娜");
        store.update(id, &updated).await.unwrap();
        let found = store.get(EntityType::Customers, id).await.unwrap().unwrap();
        assert_eq!(found.record, updated);
    }

    #[tokio::test]
    async fn test_scoped_listing() {
        let pool = connect_memory().await.unwrap();
        let store = SqliteRecordStore::new(pool);

        store.insert(&customer("客户A", "111", "张伟")).await.unwrap();
        store.insert(&customer("客户B", "222", "李娜")).await.unwrap();

        let all = store
            .list(EntityType::Customers, &Scope::All)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let owned = store
            .list(EntityType::Customers, &Scope::Owner("张伟".to_string()))
            .await
            .unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].record.field_text("name").as_deref(), Some("客户A"));
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let pool = connect_memory().await.unwrap();
        let store = SqliteRecordStore::new(pool);

        let err = store
            .update(999, &customer("无名", "000", "张伟"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
