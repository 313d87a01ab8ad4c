//! Operation history recorder.
//!
//! Append-only audit trail of completed imports and exports:
//! - one entry per operation, written once, never updated
//! - listing excludes entries older than the retention window
//! - purging old entries is a maintenance concern, exposed separately

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::domain::error::{AppError, Result};
use crate::domain::operation::{OperationEntry, OperationRecord, OperationStatus, OperationType};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct HistoryService {
    pool: SqlitePool,
}

impl HistoryService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one audit entry.
    pub async fn record(&self, entry: OperationEntry) -> Result<()> {
        info!(
            "Recording {} of {}: total={}, success={}, failed={}, skipped={}, duration={}ms",
            entry.operation_type.as_str(),
            entry.data_type,
            entry.record_count,
            entry.success_count,
            entry.failed_count,
            entry.skipped_count,
            entry.duration_ms
        );

        let result = sqlx::query(
            r#"
            INSERT INTO operation_history (
                operation_type,
                data_type,
                operator_id,
                operator_name,
                record_count,
                success_count,
                failed_count,
                skipped_count,
                status,
                file_name,
                file_size,
                duration_ms,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.operation_type.as_str())
        .bind(&entry.data_type)
        .bind(&entry.operator_id)
        .bind(&entry.operator_name)
        .bind(entry.record_count)
        .bind(entry.success_count)
        .bind(entry.failed_count)
        .bind(entry.skipped_count)
        .bind(entry.status.as_str())
        .bind(&entry.file_name)
        .bind(entry.file_size)
        .bind(entry.duration_ms)
        .bind(Utc::now().format(TIMESTAMP_FORMAT).to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Failed to record operation history: {}", e);
                Err(AppError::DatabaseError(format!(
                    "Failed to record operation history: {}",
                    e
                )))
            }
        }
    }

    /// Most recent entries within the retention window, newest first.
    pub async fn list(&self, limit: i64, retention_days: i64) -> Result<Vec<OperationRecord>> {
        let limit = limit.clamp(1, 500); // Sanity check

        let rows = sqlx::query_as::<
            _,
            (
                i64,
                String,
                String,
                String,
                String,
                i64,
                i64,
                i64,
                i64,
                String,
                Option<String>,
                Option<i64>,
                i64,
                String,
            ),
        >(
            r#"
            SELECT
                id, operation_type, data_type, operator_id, operator_name,
                record_count, success_count, failed_count, skipped_count,
                status, file_name, file_size, duration_ms, created_at
            FROM operation_history
            WHERE created_at >= datetime('now', '-' || ? || ' days')
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(retention_days)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch history: {}", e)))?;

        rows.into_iter()
            .map(
                |(
                    id,
                    operation_type,
                    data_type,
                    operator_id,
                    operator_name,
                    record_count,
                    success_count,
                    failed_count,
                    skipped_count,
                    status,
                    file_name,
                    file_size,
                    duration_ms,
                    created_at,
                )| {
                    Ok(OperationRecord {
                        id,
                        operation_type: OperationType::from_key(&operation_type).ok_or_else(
                            || {
                                AppError::DatabaseError(format!(
                                    "Corrupt operation_type \"{}\" in history {}",
                                    operation_type, id
                                ))
                            },
                        )?,
                        data_type,
                        operator_id,
                        operator_name,
                        timestamp: parse_timestamp(&created_at, id)?,
                        record_count,
                        success_count,
                        failed_count,
                        skipped_count,
                        status: OperationStatus::from_key(&status).ok_or_else(|| {
                            AppError::DatabaseError(format!(
                                "Corrupt status \"{}\" in history {}",
                                status, id
                            ))
                        })?,
                        file_name,
                        file_size,
                        duration_ms,
                    })
                },
            )
            .collect()
    }

    /// Aggregate counters over the retention window.
    pub async fn stats(&self, retention_days: i64) -> Result<HistoryStats> {
        let row: (i64, i64, i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS total_operations,
                COUNT(CASE WHEN operation_type = 'import' THEN 1 END) AS imports,
                COUNT(CASE WHEN operation_type = 'export' THEN 1 END) AS exports,
                AVG(duration_ms) AS avg_duration_ms
            FROM operation_history
            WHERE created_at >= datetime('now', '-' || ? || ' days')
            "#,
        )
        .bind(retention_days)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch history stats: {}", e)))?;

        Ok(HistoryStats {
            total_operations: row.0,
            imports: row.1,
            exports: row.2,
            avg_duration_ms: row.3,
        })
    }

    /// Delete entries older than the given age. Retention enforcement is an
    /// external maintenance concern; listing already hides stale entries.
    pub async fn clear_older_than(&self, days_old: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM operation_history
            WHERE created_at < datetime('now', '-' || ? || ' days')
            "#,
        )
        .bind(days_old)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to clear history: {}", e)))?;

        let deleted = result.rows_affected();
        info!("Cleared {} history entries older than {} days", deleted, days_old);

        Ok(deleted)
    }
}

fn parse_timestamp(raw: &str, id: i64) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|dt| dt.and_utc())
        .map_err(|e| {
            AppError::DatabaseError(format!("Corrupt timestamp in history {}: {}", id, e))
        })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_operations: i64,
    pub imports: i64,
    pub exports: i64,
    pub avg_duration_ms: Option<f64>,
}
