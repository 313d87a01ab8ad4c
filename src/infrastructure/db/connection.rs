use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::error::{AppError, Result};

const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    key_primary TEXT,
    key_secondary TEXT,
    owner_name TEXT,
    department TEXT,
    record_date TEXT,
    data_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_records_entity_key ON records(entity_type, key_primary);
CREATE INDEX IF NOT EXISTS idx_records_entity_key2 ON records(entity_type, key_secondary);
CREATE INDEX IF NOT EXISTS idx_records_entity_owner ON records(entity_type, owner_name);
CREATE INDEX IF NOT EXISTS idx_records_entity_dept ON records(entity_type, department);

CREATE TABLE IF NOT EXISTS operation_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation_type TEXT NOT NULL,
    data_type TEXT NOT NULL,
    operator_id TEXT NOT NULL,
    operator_name TEXT NOT NULL,
    record_count INTEGER NOT NULL,
    success_count INTEGER NOT NULL,
    failed_count INTEGER NOT NULL,
    skipped_count INTEGER NOT NULL,
    status TEXT NOT NULL,
    file_name TEXT,
    file_size INTEGER,
    duration_ms INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_history_created ON operation_history(created_at);
"#;

/// Open (creating if missing) the console database and bring its schema up
/// to date. Schema application is additive; a database written by a newer
/// binary fails fast instead of being silently downgraded.
pub async fn init_db(db_path: &Path) -> Result<SqlitePool> {
    let pool = connect_pool(db_path).await?;

    let current = read_user_version(&pool).await?;
    if current > SCHEMA_VERSION {
        return Err(AppError::DatabaseError(format!(
            "Database schema too new: user_version={} > supported={}",
            current, SCHEMA_VERSION
        )));
    }

    apply_schema(&pool).await?;
    set_user_version(&pool, SCHEMA_VERSION).await?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Database health check failed: {}", e)))?;

    Ok(pool)
}

/// In-memory database with the full schema applied. One connection only:
/// each pooled SQLite `:memory:` connection is its own database.
pub async fn connect_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| AppError::DatabaseError(format!("Invalid memory DSN: {}", e)))?;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to open memory db: {}", e)))?;

    apply_schema(&pool).await?;
    Ok(pool)
}

async fn connect_pool(db_path: &Path) -> Result<SqlitePool> {
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| AppError::DatabaseError("Database path is not valid UTF-8".to_string()))?;
    let url = format!("sqlite://{}", db_path_str.replace('\\', "/"));

    let options = SqliteConnectOptions::from_str(&url)
        .map_err(|e| AppError::DatabaseError(format!("Invalid database URL: {}", e)))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to open database: {}", e)))
}

async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to apply schema: {}", e)))?;
    }
    Ok(())
}

async fn read_user_version(pool: &SqlitePool) -> Result<i32> {
    let row = sqlx::query("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to read user_version: {}", e)))?;
    row.try_get::<i32, _>(0)
        .map_err(|e| AppError::DatabaseError(format!("Failed to decode user_version: {}", e)))
}

async fn set_user_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query(&format!("PRAGMA user_version = {}", version))
        .execute(pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to set user_version: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_db_has_schema() {
        let pool = connect_memory().await.unwrap();
        sqlx::query("SELECT COUNT(*) FROM records")
            .fetch_one(&pool)
            .await
            .unwrap();
        sqlx::query("SELECT COUNT(*) FROM operation_history")
            .fetch_one(&pool)
            .await
            .unwrap();
    }
}
