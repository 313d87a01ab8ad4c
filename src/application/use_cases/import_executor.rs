//! Import executor.
//!
//! Drives one upload through the pipeline:
//! codec -> validator -> duplicate detector -> batched commit -> history.
//!
//! State machine per operation:
//! `Idle -> Validating -> {ValidationBlocked | ValidationPassed}
//!       -> Importing -> {Completed | PartiallyFailed}`.
//! Terminal states are never re-entered; a fresh upload starts a new ticket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use crate::application::use_cases::codec::parse_upload;
use crate::application::use_cases::duplicate_detector;
use crate::application::use_cases::history_service::HistoryService;
use crate::application::use_cases::roster_cache::RosterCache;
use crate::application::use_cases::row_validator::{build_record, validate};
use crate::domain::entity::{EntityType, Operator};
use crate::domain::error::{AppError, Result};
use crate::domain::import::{
    has_blocking_issues, DuplicateCandidate, DuplicateStrategy, ImportPhase, ImportRow,
    ImportSummary, RowOutcome, RowStatus, ValidationIssue,
};
use crate::domain::operation::{OperationEntry, OperationStatus, OperationType};
use crate::infrastructure::config::{BATCH_SIZE, PREVIEW_LIMIT};
use crate::infrastructure::store::RecordStore;

pub const IMPORT_PERMISSION: &str = "data:import";

/// One prepared upload awaiting confirmation.
struct PendingImport {
    entity: EntityType,
    file_name: String,
    file_size: usize,
    phase: ImportPhase,
    rows: Vec<ImportRow>,
    duplicates: Vec<DuplicateCandidate>,
}

/// What the UI needs to render the confirmation dialog.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ImportPreview {
    pub ticket: Uuid,
    pub phase: ImportPhase,
    pub total_rows: usize,
    pub preview_rows: Vec<ImportRow>,
    pub issues: Vec<ValidationIssue>,
    pub duplicates: Vec<DuplicateCandidate>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ImportReport {
    pub phase: ImportPhase,
    pub summary: ImportSummary,
    pub outcomes: Vec<RowOutcome>,
}

pub struct ImportExecutor {
    store: Arc<dyn RecordStore>,
    history: Arc<HistoryService>,
    roster: Arc<RosterCache>,
    pending: Mutex<HashMap<Uuid, PendingImport>>,
}

impl ImportExecutor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        history: Arc<HistoryService>,
        roster: Arc<RosterCache>,
    ) -> Self {
        Self {
            store,
            history,
            roster,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Parse, validate and duplicate-check one upload. Returns a ticket the
    /// caller presents when confirming; confirmation stays unavailable while
    /// any error-severity issue exists.
    pub async fn prepare(
        &self,
        operator: &Operator,
        entity: EntityType,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<ImportPreview> {
        if !operator.has_permission(IMPORT_PERMISSION) {
            return Err(AppError::PermissionError(format!(
                "操作员 {} 没有导入权限",
                operator.name
            )));
        }

        info!(
            "Preparing import of {} for {} ({} bytes)",
            entity.key(),
            operator.name,
            bytes.len()
        );

        let parsed = parse_upload(entity, file_name, bytes)?;
        let roster = self.roster.snapshot(self.store.as_ref()).await?;

        let mut issues = parsed.notes.clone();
        issues.extend(validate(entity, &parsed.rows, &roster));

        let detection =
            duplicate_detector::detect(self.store.as_ref(), entity, &parsed.rows, &issues).await?;
        issues.extend(detection.notes);

        let phase = if has_blocking_issues(&issues) {
            ImportPhase::ValidationBlocked
        } else {
            ImportPhase::ValidationPassed
        };

        let ticket = Uuid::new_v4();
        let preview_rows: Vec<ImportRow> =
            parsed.rows.iter().take(PREVIEW_LIMIT).cloned().collect();
        let total_rows = parsed.rows.len();

        self.pending.lock().unwrap().insert(
            ticket,
            PendingImport {
                entity,
                file_name: file_name.to_string(),
                file_size: bytes.len(),
                phase,
                rows: parsed.rows,
                duplicates: detection.candidates.clone(),
            },
        );

        info!(
            "Import {} prepared: {} rows, {} issues, {} duplicates, phase {:?}",
            ticket,
            total_rows,
            issues.len(),
            detection.candidates.len(),
            phase
        );

        Ok(ImportPreview {
            ticket,
            phase,
            total_rows,
            preview_rows,
            issues,
            duplicates: detection.candidates,
        })
    }

    /// Commit a prepared upload under the chosen duplicate strategy.
    ///
    /// Rows are written in batches of `BATCH_SIZE`; one row's persistence
    /// failure marks that row failed and never aborts the operation. Each
    /// written row is durable immediately (partial commit).
    pub async fn commit(
        &self,
        operator: &Operator,
        ticket: Uuid,
        strategy: DuplicateStrategy,
    ) -> Result<ImportReport> {
        if !operator.has_permission(IMPORT_PERMISSION) {
            return Err(AppError::PermissionError(format!(
                "操作员 {} 没有导入权限",
                operator.name
            )));
        }

        // Taking the ticket out makes terminal states unreachable twice.
        let pending = {
            let mut pending_map = self.pending.lock().unwrap();
            let phase = pending_map
                .get(&ticket)
                .map(|p| p.phase)
                .ok_or_else(|| AppError::NotFound(format!("导入批次 {} 不存在", ticket)))?;
            if !phase.can_confirm() {
                return Err(AppError::ValidationError(format!(
                    "导入批次 {} 当前状态 {:?} 不可确认",
                    ticket, phase
                )));
            }
            match pending_map.remove(&ticket) {
                Some(p) => p,
                None => {
                    return Err(AppError::NotFound(format!("导入批次 {} 不存在", ticket)))
                }
            }
        };

        info!(
            "Importing {} rows of {} (strategy {:?})",
            pending.rows.len(),
            pending.entity.key(),
            strategy
        );

        let started = Instant::now();
        let duplicate_ids: HashMap<usize, i64> = pending
            .duplicates
            .iter()
            .map(|d| (d.row_index, d.existing_record_id))
            .collect();

        let mut outcomes = Vec::with_capacity(pending.rows.len());
        for (batch_index, batch) in pending.rows.chunks(BATCH_SIZE).enumerate() {
            for row in batch {
                let outcome = self
                    .commit_row(pending.entity, row, &duplicate_ids, strategy)
                    .await;
                outcomes.push(outcome);
            }
            info!(
                "Import batch {} of {} done ({} rows)",
                batch_index + 1,
                pending.rows.len().div_ceil(BATCH_SIZE),
                batch.len()
            );
        }

        let mut summary = ImportSummary {
            success: 0,
            failed: 0,
            skipped: 0,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        for outcome in &outcomes {
            match outcome.status {
                RowStatus::Imported | RowStatus::Overwritten => summary.success += 1,
                RowStatus::Skipped => summary.skipped += 1,
                RowStatus::Failed { .. } => summary.failed += 1,
            }
        }

        let phase = if summary.failed == 0 {
            ImportPhase::Completed
        } else {
            ImportPhase::PartiallyFailed
        };
        let status = if summary.failed == 0 {
            OperationStatus::Success
        } else {
            OperationStatus::Partial
        };

        // The records changed; lookup sets must be rebuilt on next use.
        self.roster.invalidate();

        let entry = OperationEntry {
            operation_type: OperationType::Import,
            data_type: pending.entity.key().to_string(),
            operator_id: operator.id.clone(),
            operator_name: operator.name.clone(),
            record_count: outcomes.len() as i64,
            success_count: summary.success as i64,
            failed_count: summary.failed as i64,
            skipped_count: summary.skipped as i64,
            status,
            file_name: Some(pending.file_name.clone()),
            file_size: Some(pending.file_size as i64),
            duration_ms: summary.duration_ms as i64,
        };
        if let Err(e) = self.history.record(entry).await {
            // The import itself is durable; a lost audit row is logged, not fatal.
            warn!("Import {} finished but history write failed: {}", ticket, e);
        }

        info!(
            "Import {} finished: success={}, failed={}, skipped={} in {}ms",
            ticket, summary.success, summary.failed, summary.skipped, summary.duration_ms
        );

        Ok(ImportReport {
            phase,
            summary,
            outcomes,
        })
    }

    /// Drop a prepared upload without committing (user re-uploads).
    pub fn discard(&self, ticket: Uuid) -> bool {
        self.pending.lock().unwrap().remove(&ticket).is_some()
    }

    async fn commit_row(
        &self,
        entity: EntityType,
        row: &ImportRow,
        duplicate_ids: &HashMap<usize, i64>,
        strategy: DuplicateStrategy,
    ) -> RowOutcome {
        let record = match build_record(entity, row) {
            Ok(record) => record,
            Err(e) => {
                return RowOutcome {
                    row_index: row.row_index,
                    status: RowStatus::Failed {
                        reason: e.to_string(),
                    },
                }
            }
        };

        let status = match duplicate_ids.get(&row.row_index) {
            Some(existing_id) => match strategy {
                DuplicateStrategy::Skip => RowStatus::Skipped,
                DuplicateStrategy::Overwrite => {
                    match self.store.update(*existing_id, &record).await {
                        Ok(()) => RowStatus::Overwritten,
                        Err(e) => RowStatus::Failed {
                            reason: e.to_string(),
                        },
                    }
                }
                DuplicateStrategy::KeepBoth => match self.store.insert(&record).await {
                    Ok(_) => RowStatus::Imported,
                    Err(e) => RowStatus::Failed {
                        reason: e.to_string(),
                    },
                },
            },
            None => match self.store.insert(&record).await {
                Ok(_) => RowStatus::Imported,
                Err(e) => RowStatus::Failed {
                    reason: e.to_string(),
                },
            },
        };

        RowOutcome {
            row_index: row.row_index,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{EntityRecord, Role, StoredRecord};
    use crate::domain::import::UniqueKey;
    use crate::infrastructure::db::connection::connect_memory;
    use crate::infrastructure::store::{MemoryRecordStore, Scope};

    async fn executor_with(store: Arc<dyn RecordStore>) -> ImportExecutor {
        let pool = connect_memory().await.unwrap();
        ImportExecutor::new(
            store,
            Arc::new(HistoryService::new(pool)),
            Arc::new(RosterCache::new()),
        )
    }

    fn admin() -> Operator {
        Operator {
            id: "u-admin".to_string(),
            name: "管理员".to_string(),
            role: Role::Admin,
            department: None,
            permissions: vec!["data:import".to_string(), "data:export".to_string()],
        }
    }

    const COURSES_CSV: &str = "课程编码,课程名称,课程模块,学制天数,年开班次数\n\
                               LD-101,高管领导力,领导力,3,6\n\
                               GM-201,目标管理,通用管理,2,4\n\
                               SK-301,商务谈判,专业技能,2,8\n";

    const CUSTOMER_CSV: &str = "客户姓名,联系电话,所在企业\n王芳,13800138000,星辰科技\n";

    #[tokio::test]
    async fn test_import_three_new_courses() {
        let store = Arc::new(MemoryRecordStore::new());
        let executor = executor_with(store.clone()).await;

        let preview = executor
            .prepare(
                &admin(),
                EntityType::Courses,
                "courses.csv",
                COURSES_CSV.as_bytes(),
            )
            .await
            .unwrap();
        assert_eq!(preview.phase, ImportPhase::ValidationPassed);
        assert_eq!(preview.total_rows, 3);
        assert!(preview.duplicates.is_empty());

        let report = executor
            .commit(&admin(), preview.ticket, DuplicateStrategy::Skip)
            .await
            .unwrap();
        assert_eq!(report.phase, ImportPhase::Completed);
        assert_eq!(report.summary.success, 3);
        assert_eq!(report.summary.failed, 0);
        assert_eq!(report.summary.skipped, 0);
        assert_eq!(report.summary.total(), 3);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_blocked_validation_cannot_confirm() {
        let executor = executor_with(Arc::new(MemoryRecordStore::new())).await;

        let csv = "课程编码,课程名称,课程模块,学制天数,年开班次数\nLD-101,,领导力,3,6\n";
        let preview = executor
            .prepare(&admin(), EntityType::Courses, "courses.csv", csv.as_bytes())
            .await
            .unwrap();
        assert_eq!(preview.phase, ImportPhase::ValidationBlocked);

        let err = executor
            .commit(&admin(), preview.ticket, DuplicateStrategy::Skip)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_skip_strategy_leaves_existing_untouched() {
        let store = Arc::new(MemoryRecordStore::new());
        let executor = executor_with(store.clone()).await;

        // Seed the conflicting customer, then import a row with the same phone.
        let first = executor
            .prepare(
                &admin(),
                EntityType::Customers,
                "customers.csv",
                CUSTOMER_CSV.as_bytes(),
            )
            .await
            .unwrap();
        executor
            .commit(&admin(), first.ticket, DuplicateStrategy::Skip)
            .await
            .unwrap();

        let second_csv = "客户姓名,联系电话,所在企业\n王芳改,13800138000,新公司\n";
        let preview = executor
            .prepare(
                &admin(),
                EntityType::Customers,
                "customers.csv",
                second_csv.as_bytes(),
            )
            .await
            .unwrap();
        assert_eq!(preview.duplicates.len(), 1);

        let report = executor
            .commit(&admin(), preview.ticket, DuplicateStrategy::Skip)
            .await
            .unwrap();
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.summary.success, 0);

        let existing = store
            .find_by_key(
                EntityType::Customers,
                &UniqueKey::CustomerPhone {
                    phone: "13800138000".to_string(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(existing.record.field_text("name").as_deref(), Some("王芳"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_overwrite_strategy_updates_existing() {
        let store = Arc::new(MemoryRecordStore::new());
        let executor = executor_with(store.clone()).await;

        let first = executor
            .prepare(
                &admin(),
                EntityType::Customers,
                "customers.csv",
                CUSTOMER_CSV.as_bytes(),
            )
            .await
            .unwrap();
        executor
            .commit(&admin(), first.ticket, DuplicateStrategy::Skip)
            .await
            .unwrap();

        let second_csv = "客户姓名,联系电话,所在企业\n王芳改,13800138000,新公司\n";
        let preview = executor
            .prepare(
                &admin(),
                EntityType::Customers,
                "customers.csv",
                second_csv.as_bytes(),
            )
            .await
            .unwrap();
        let report = executor
            .commit(&admin(), preview.ticket, DuplicateStrategy::Overwrite)
            .await
            .unwrap();

        assert_eq!(report.summary.success, 1);
        assert_eq!(report.summary.skipped, 0);
        assert!(matches!(report.outcomes[0].status, RowStatus::Overwritten));

        let existing = store
            .find_by_key(
                EntityType::Customers,
                &UniqueKey::CustomerPhone {
                    phone: "13800138000".to_string(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            existing.record.field_text("name").as_deref(),
            Some("王芳改")
        );
        assert_eq!(
            existing.record.field_text("company").as_deref(),
            Some("新公司")
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_keep_both_inserts_alongside_existing() {
        let store = Arc::new(MemoryRecordStore::new());
        let executor = executor_with(store.clone()).await;

        let first = executor
            .prepare(
                &admin(),
                EntityType::Customers,
                "customers.csv",
                CUSTOMER_CSV.as_bytes(),
            )
            .await
            .unwrap();
        executor
            .commit(&admin(), first.ticket, DuplicateStrategy::Skip)
            .await
            .unwrap();

        let preview = executor
            .prepare(
                &admin(),
                EntityType::Customers,
                "customers.csv",
                CUSTOMER_CSV.as_bytes(),
            )
            .await
            .unwrap();
        let report = executor
            .commit(&admin(), preview.ticket, DuplicateStrategy::KeepBoth)
            .await
            .unwrap();

        assert_eq!(report.summary.success, 1);
        assert!(matches!(report.outcomes[0].status, RowStatus::Imported));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_reimport_with_skip_is_idempotent() {
        let store = Arc::new(MemoryRecordStore::new());
        let executor = executor_with(store.clone()).await;

        let first = executor
            .prepare(
                &admin(),
                EntityType::Courses,
                "courses.csv",
                COURSES_CSV.as_bytes(),
            )
            .await
            .unwrap();
        executor
            .commit(&admin(), first.ticket, DuplicateStrategy::Skip)
            .await
            .unwrap();

        let second = executor
            .prepare(
                &admin(),
                EntityType::Courses,
                "courses.csv",
                COURSES_CSV.as_bytes(),
            )
            .await
            .unwrap();
        let report = executor
            .commit(&admin(), second.ticket, DuplicateStrategy::Skip)
            .await
            .unwrap();

        assert_eq!(report.summary.skipped, 3);
        assert_eq!(report.summary.success, 0);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_permission_short_circuits() {
        let executor = executor_with(Arc::new(MemoryRecordStore::new())).await;
        let viewer = Operator {
            permissions: vec!["data:export".to_string()],
            ..admin()
        };

        let err = executor
            .prepare(
                &viewer,
                EntityType::Courses,
                "courses.csv",
                COURSES_CSV.as_bytes(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionError(_)));
    }

    /// Store wrapper that fails inserts for one marker value, to exercise
    /// per-row failure isolation.
    struct FlakyStore {
        inner: MemoryRecordStore,
        poison: String,
    }

    #[async_trait::async_trait]
    impl RecordStore for FlakyStore {
        async fn find_by_key(
            &self,
            entity: EntityType,
            key: &UniqueKey,
        ) -> crate::domain::error::Result<Option<StoredRecord>> {
            self.inner.find_by_key(entity, key).await
        }

        async fn get(
            &self,
            entity: EntityType,
            id: i64,
        ) -> crate::domain::error::Result<Option<StoredRecord>> {
            self.inner.get(entity, id).await
        }

        async fn insert(&self, record: &EntityRecord) -> crate::domain::error::Result<i64> {
            if record.field_text("name").as_deref() == Some(self.poison.as_str()) {
                return Err(AppError::DatabaseError("disk full".to_string()));
            }
            self.inner.insert(record).await
        }

        async fn update(
            &self,
            id: i64,
            record: &EntityRecord,
        ) -> crate::domain::error::Result<()> {
            self.inner.update(id, record).await
        }

        async fn list(
            &self,
            entity: EntityType,
            scope: &Scope,
        ) -> crate::domain::error::Result<Vec<StoredRecord>> {
            self.inner.list(entity, scope).await
        }
    }

    #[tokio::test]
    async fn test_row_failure_does_not_abort_operation() {
        let store = Arc::new(FlakyStore {
            inner: MemoryRecordStore::new(),
            poison: "目标管理".to_string(),
        });
        let executor = executor_with(store.clone()).await;

        let preview = executor
            .prepare(
                &admin(),
                EntityType::Courses,
                "courses.csv",
                COURSES_CSV.as_bytes(),
            )
            .await
            .unwrap();
        let report = executor
            .commit(&admin(), preview.ticket, DuplicateStrategy::Skip)
            .await
            .unwrap();

        assert_eq!(report.phase, ImportPhase::PartiallyFailed);
        assert_eq!(report.summary.success, 2);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.total(), 3);

        let failed: Vec<_> = report
            .outcomes
            .iter()
            .filter(|o| matches!(o.status, RowStatus::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].row_index, 2);
        match &failed[0].status {
            RowStatus::Failed { reason } => assert!(reason.contains("disk full")),
            other => panic!("unexpected status: {:?}", other),
        }
    }
}
