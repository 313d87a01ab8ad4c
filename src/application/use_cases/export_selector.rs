//! Export selector.
//!
//! Applies, in order: role scope, range filter, entity-specific filters,
//! field projection in registry order with localized labels. The two
//! performance kinds are computed aggregations over customers and training
//! sessions, not projections of stored rows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::application::use_cases::codec::{self, ExportTable};
use crate::application::use_cases::history_service::HistoryService;
use crate::application::use_cases::roster_cache::RosterCache;
use crate::application::use_cases::schema_registry::{fields_for, FieldDefinition};
use crate::domain::entity::{
    format_amount, EntityRecord, EntityType, Operator, Role, StoredRecord,
};
use crate::domain::error::{AppError, Result};
use crate::domain::export::{DateRange, ExportConfig, ExportRange, TimeBucket};
use crate::domain::operation::{OperationEntry, OperationStatus, OperationType};
use crate::infrastructure::store::{RecordStore, Scope};

pub const EXPORT_PERMISSION: &str = "data:export";

/// Encoded export ready to hand to the download response.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub struct ExportService {
    store: Arc<dyn RecordStore>,
    roster: Arc<RosterCache>,
    history: Arc<HistoryService>,
}

impl ExportService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        roster: Arc<RosterCache>,
        history: Arc<HistoryService>,
    ) -> Self {
        Self {
            store,
            roster,
            history,
        }
    }

    /// Select, encode and audit one export. `today` anchors the relative
    /// time buckets.
    pub async fn export(
        &self,
        operator: &Operator,
        config: &ExportConfig,
        today: NaiveDate,
    ) -> Result<ExportFile> {
        let started = Instant::now();
        let table = self.select(operator, config, today).await?;
        let row_count = table.rows.len();
        let bytes = codec::encode(&table, config.format)?;

        let file_name = format!(
            "{}_{}.{}",
            config.entity_type.key(),
            today.format("%Y%m%d"),
            config.format.extension()
        );

        let entry = OperationEntry {
            operation_type: OperationType::Export,
            data_type: config.entity_type.key().to_string(),
            operator_id: operator.id.clone(),
            operator_name: operator.name.clone(),
            record_count: row_count as i64,
            success_count: row_count as i64,
            failed_count: 0,
            skipped_count: 0,
            status: OperationStatus::Success,
            file_name: Some(file_name.clone()),
            file_size: Some(bytes.len() as i64),
            duration_ms: started.elapsed().as_millis() as i64,
        };
        if let Err(e) = self.history.record(entry).await {
            warn!("Export finished but history write failed: {}", e);
        }

        Ok(ExportFile {
            file_name,
            content_type: config.format.content_type(),
            bytes,
        })
    }

    /// Scoped, filtered, projected rows for one export configuration.
    pub async fn select(
        &self,
        operator: &Operator,
        config: &ExportConfig,
        today: NaiveDate,
    ) -> Result<ExportTable> {
        if !operator.has_permission(EXPORT_PERMISSION) {
            return Err(AppError::PermissionError(format!(
                "操作员 {} 没有导出权限",
                operator.name
            )));
        }

        info!(
            "Exporting {} for {} (range {:?})",
            config.entity_type.key(),
            operator.name,
            config.range
        );

        match config.entity_type {
            EntityType::SalespersonPerformance => {
                self.select_salesperson_performance(operator, config, today)
                    .await
            }
            EntityType::CourseSalesPerformance => {
                self.select_course_sales_performance(config, today).await
            }
            _ => self.select_stored(operator, config, today).await,
        }
    }

    async fn select_stored(
        &self,
        operator: &Operator,
        config: &ExportConfig,
        today: NaiveDate,
    ) -> Result<ExportTable> {
        let scope = role_scope(config.entity_type, operator)?;
        let records = self.store.list(config.entity_type, &scope).await?;

        let window = range_window(config, today)?;
        let mut selected = Vec::new();
        for stored in records {
            if let Some(window) = &window {
                if !window.contains(record_date(&stored)) {
                    continue;
                }
            }
            if config.range == ExportRange::Filtered && !matches_filters(&stored.record, config) {
                continue;
            }
            selected.push(stored);
        }

        let fields = projection_fields(config.entity_type, &config.selected_fields);
        let rows = selected
            .iter()
            .map(|stored| {
                fields
                    .iter()
                    .map(|f| stored.record.field_text(f.key).unwrap_or_default())
                    .collect()
            })
            .collect();

        Ok(ExportTable {
            title: config.entity_type.display_name().to_string(),
            fields,
            rows,
        })
    }

    async fn select_salesperson_performance(
        &self,
        operator: &Operator,
        config: &ExportConfig,
        today: NaiveDate,
    ) -> Result<ExportTable> {
        let roster = self.roster.snapshot(self.store.as_ref()).await?;
        let window = performance_window(config, today)?;

        let department_filter = filter_value(config, "department");
        if let Some(department) = &department_filter {
            if !roster.has_department(department) {
                warn!("Export filter references unknown department {}", department);
            }
        }
        let name_filter = filter_value(config, "salesperson");

        let mut salespersons = Vec::new();
        for stored in self
            .store
            .list(EntityType::Salespersons, &Scope::All)
            .await?
        {
            if let EntityRecord::Salesperson(s) = stored.record {
                let visible = match operator.role {
                    Role::Admin => true,
                    Role::Manager => operator.department.as_deref() == Some(s.department.as_str()),
                    Role::Salesperson => operator.name == s.name,
                };
                if !visible {
                    continue;
                }
                if let Some(department) = &department_filter {
                    if &s.department != department {
                        continue;
                    }
                }
                if let Some(name) = &name_filter {
                    if &s.name != name {
                        continue;
                    }
                }
                salespersons.push(s);
            }
        }

        let customers = self.store.list(EntityType::Customers, &Scope::All).await?;

        let mut rows_by_key: Vec<HashMap<&'static str, String>> = Vec::new();
        for salesperson in &salespersons {
            let mut customer_count = 0usize;
            let mut signed_count = 0usize;
            let mut revenue = 0f64;

            for stored in &customers {
                let customer = match &stored.record {
                    EntityRecord::Customer(c) => c,
                    _ => continue,
                };
                if customer.owner_name.as_deref() != Some(salesperson.name.as_str()) {
                    continue;
                }
                // Signed customers bucket by deal date, the rest by intake date.
                let activity = if customer.signed {
                    customer.deal_date.unwrap_or(stored.created_at.date_naive())
                } else {
                    stored.created_at.date_naive()
                };
                if let Some(window) = &window {
                    if !window.contains(activity) {
                        continue;
                    }
                }
                customer_count += 1;
                if customer.signed {
                    signed_count += 1;
                    revenue += customer.deal_amount.unwrap_or(0.0);
                }
            }

            let conversion = if customer_count > 0 {
                format!("{:.1}%", signed_count as f64 * 100.0 / customer_count as f64)
            } else {
                "0.0%".to_string()
            };

            let mut row = HashMap::new();
            row.insert("salesperson", salesperson.name.clone());
            row.insert("department", salesperson.department.clone());
            row.insert("customer_count", customer_count.to_string());
            row.insert("signed_count", signed_count.to_string());
            row.insert("conversion_rate", conversion);
            row.insert("revenue", format_amount(revenue));
            rows_by_key.push(row);
        }

        sort_rows(&mut rows_by_key, "revenue", "salesperson");
        Ok(project_computed(
            EntityType::SalespersonPerformance,
            config,
            rows_by_key,
        ))
    }

    async fn select_course_sales_performance(
        &self,
        config: &ExportConfig,
        today: NaiveDate,
    ) -> Result<ExportTable> {
        let window = performance_window(config, today)?;
        let name_filter = filter_value(config, "course_name");

        let mut courses = Vec::new();
        for stored in self.store.list(EntityType::Courses, &Scope::All).await? {
            if let EntityRecord::Course(c) = stored.record {
                if let Some(name) = &name_filter {
                    if !c.name.contains(name.as_str()) {
                        continue;
                    }
                }
                courses.push(c);
            }
        }

        let sessions = self
            .store
            .list(EntityType::TrainingSessions, &Scope::All)
            .await?;

        let mut rows_by_key: Vec<HashMap<&'static str, String>> = Vec::new();
        for course in &courses {
            let code = match &course.code {
                Some(code) => code.clone(),
                // Sessions reference courses by code; uncoded courses have none.
                None => String::new(),
            };

            let mut session_count = 0usize;
            let mut completed = 0usize;
            let mut total_enrolled = 0i64;

            for stored in &sessions {
                let session = match &stored.record {
                    EntityRecord::TrainingSession(t) => t,
                    _ => continue,
                };
                if code.is_empty() || session.course_code != code {
                    continue;
                }
                if let Some(window) = &window {
                    if !window.contains(session.start_date) {
                        continue;
                    }
                }
                session_count += 1;
                if session.status.as_deref() == Some("已结课") {
                    completed += 1;
                }
                total_enrolled += session.enrolled.unwrap_or(0);
            }

            let revenue = total_enrolled as f64 * course.price.unwrap_or(0.0);

            let mut row = HashMap::new();
            row.insert("course_code", code);
            row.insert("course_name", course.name.clone());
            row.insert("module", course.module.clone());
            row.insert("session_count", session_count.to_string());
            row.insert("completed_sessions", completed.to_string());
            row.insert("total_enrolled", total_enrolled.to_string());
            row.insert("revenue", format_amount(revenue));
            rows_by_key.push(row);
        }

        sort_rows(&mut rows_by_key, "revenue", "course_name");
        Ok(project_computed(
            EntityType::CourseSalesPerformance,
            config,
            rows_by_key,
        ))
    }
}

/// Role scope for stored entities. Shared catalogs stay unrestricted; the
/// customer book narrows to the caller's own records or department.
fn role_scope(entity: EntityType, operator: &Operator) -> Result<Scope> {
    match entity {
        EntityType::Customers | EntityType::Salespersons => match operator.role {
            Role::Admin => Ok(Scope::All),
            Role::Manager => operator
                .department
                .clone()
                .map(Scope::Department)
                .ok_or_else(|| {
                    AppError::PermissionError(format!(
                        "经理 {} 缺少部门信息, 无法确定数据范围",
                        operator.name
                    ))
                }),
            Role::Salesperson => Ok(Scope::Owner(operator.name.clone())),
        },
        _ => Ok(Scope::All),
    }
}

fn projection_fields(
    entity: EntityType,
    selected: &[String],
) -> Vec<&'static FieldDefinition> {
    let fields = fields_for(entity);
    if selected.is_empty() {
        fields.iter().collect()
    } else {
        fields
            .iter()
            .filter(|f| selected.iter().any(|s| s == f.key))
            .collect()
    }
}

fn project_computed(
    entity: EntityType,
    config: &ExportConfig,
    rows: Vec<HashMap<&'static str, String>>,
) -> ExportTable {
    let fields = projection_fields(entity, &config.selected_fields);
    let projected = rows
        .into_iter()
        .map(|row| {
            fields
                .iter()
                .map(|f| row.get(f.key).cloned().unwrap_or_default())
                .collect()
        })
        .collect();
    ExportTable {
        title: entity.display_name().to_string(),
        fields,
        rows: projected,
    }
}

fn sort_rows(
    rows: &mut [HashMap<&'static str, String>],
    amount_key: &'static str,
    tiebreak_key: &'static str,
) {
    rows.sort_by(|a, b| {
        let amount_a: f64 = a.get(amount_key).and_then(|v| v.parse().ok()).unwrap_or(0.0);
        let amount_b: f64 = b.get(amount_key).and_then(|v| v.parse().ok()).unwrap_or(0.0);
        amount_b
            .partial_cmp(&amount_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.get(tiebreak_key).cmp(&b.get(tiebreak_key)))
    });
}

fn filter_value(config: &ExportConfig, key: &str) -> Option<String> {
    config
        .filters
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Window for the custom range of stored-entity exports.
fn range_window(config: &ExportConfig, _today: NaiveDate) -> Result<Option<DateRange>> {
    match config.range {
        ExportRange::Custom => config.date_range.map(Some).ok_or_else(|| {
            AppError::ValidationError("自定义导出范围需要提供日期区间".to_string())
        }),
        _ => Ok(None),
    }
}

/// Window for the performance views: an explicit custom range wins,
/// otherwise the `time_range` bucket filter resolves against `today`.
fn performance_window(config: &ExportConfig, today: NaiveDate) -> Result<Option<DateRange>> {
    if config.range == ExportRange::Custom {
        return range_window(config, today);
    }
    match filter_value(config, "time_range") {
        Some(label) => {
            let bucket = TimeBucket::from_label(&label).ok_or_else(|| {
                AppError::ValidationError(format!("无法识别的时间范围 \"{}\"", label))
            })?;
            Ok(Some(bucket.resolve(today)))
        }
        None => Ok(None),
    }
}

/// Date a stored record files under for custom-range exports: its indexed
/// business date when it has one, its intake timestamp otherwise.
fn record_date(stored: &StoredRecord) -> NaiveDate {
    let cols = crate::infrastructure::store::index_columns(&stored.record);
    cols.record_date
        .as_deref()
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .unwrap_or_else(|| stored.created_at.date_naive())
}

fn matches_filters(record: &EntityRecord, config: &ExportConfig) -> bool {
    config.filters.iter().all(|(key, expected)| {
        let expected = expected.trim();
        if expected.is_empty() || key == "time_range" {
            return true;
        }
        match record.field_text(key) {
            Some(actual) => actual == expected,
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{Course, Customer, Salesperson, TrainingSession};
    use crate::domain::export::ExportFormat;
    use crate::infrastructure::db::connection::connect_memory;
    use crate::infrastructure::store::MemoryRecordStore;
    use std::collections::BTreeMap;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn operator(role: Role, name: &str, department: Option<&str>) -> Operator {
        Operator {
            id: format!("u-{}", name),
            name: name.to_string(),
            role,
            department: department.map(str::to_string),
            permissions: vec!["data:import".to_string(), "data:export".to_string()],
        }
    }

    fn salesperson(name: &str, department: &str) -> EntityRecord {
        EntityRecord::Salesperson(Salesperson {
            name: name.to_string(),
            employee_no: None,
            department: department.to_string(),
            position: None,
            phone: None,
            email: None,
            hire_date: None,
            monthly_target: None,
        })
    }

    fn customer(
        name: &str,
        owner: &str,
        department: &str,
        signed: bool,
        deal_amount: Option<f64>,
        deal_date: Option<NaiveDate>,
    ) -> EntityRecord {
        EntityRecord::Customer(Customer {
            name: name.to_string(),
            company: None,
            position: None,
            phone: None,
            email: None,
            source: None,
            intent_level: None,
            signed,
            deal_amount,
            deal_date,
            owner_name: Some(owner.to_string()),
            department: Some(department.to_string()),
            remark: None,
        })
    }

    fn config(entity: EntityType) -> ExportConfig {
        ExportConfig {
            entity_type: entity,
            format: ExportFormat::Csv,
            range: ExportRange::All,
            date_range: None,
            selected_fields: Vec::new(),
            filters: BTreeMap::new(),
        }
    }

    async fn service(store: Arc<MemoryRecordStore>) -> ExportService {
        let pool = connect_memory().await.unwrap();
        ExportService::new(
            store,
            Arc::new(RosterCache::new()),
            Arc::new(HistoryService::new(pool)),
        )
    }

    #[tokio::test]
    async fn test_salesperson_sees_only_owned_customers() {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .insert(&customer("客户A", "张伟", "销售一部", false, None, None))
            .await
            .unwrap();
        store
            .insert(&customer("客户B", "李娜", "销售二部", false, None, None))
            .await
            .unwrap();

        let service = service(store).await;
        let table = service
            .select(
                &operator(Role::Salesperson, "张伟", None),
                &config(EntityType::Customers),
                date(2026, 8, 6),
            )
            .await
            .unwrap();

        assert_eq!(table.rows.len(), 1);
        let name_col = table.fields.iter().position(|f| f.key == "name").unwrap();
        assert_eq!(table.rows[0][name_col], "客户A");
    }

    #[tokio::test]
    async fn test_projection_respects_selected_fields_in_registry_order() {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .insert(&customer("客户A", "张伟", "销售一部", false, None, None))
            .await
            .unwrap();

        let service = service(store).await;
        let mut cfg = config(EntityType::Customers);
        // Out of registry order on purpose.
        cfg.selected_fields = vec!["phone".to_string(), "name".to_string()];

        let table = service
            .select(
                &operator(Role::Admin, "管理员", None),
                &cfg,
                date(2026, 8, 6),
            )
            .await
            .unwrap();

        let keys: Vec<_> = table.fields.iter().map(|f| f.key).collect();
        assert_eq!(keys, vec!["name", "phone"]);
        assert_eq!(table.fields[0].label, "客户姓名");
    }

    #[tokio::test]
    async fn test_filtered_range_applies_equality_filters() {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .insert(&customer("客户A", "张伟", "销售一部", false, None, None))
            .await
            .unwrap();
        store
            .insert(&customer("客户B", "李娜", "销售二部", false, None, None))
            .await
            .unwrap();

        let service = service(store).await;
        let mut cfg = config(EntityType::Customers);
        cfg.range = ExportRange::Filtered;
        cfg.filters
            .insert("department".to_string(), "销售二部".to_string());

        let table = service
            .select(
                &operator(Role::Admin, "管理员", None),
                &cfg,
                date(2026, 8, 6),
            )
            .await
            .unwrap();
        assert_eq!(table.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_custom_range_filters_by_deal_date() {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .insert(&customer(
                "成交客户",
                "张伟",
                "销售一部",
                true,
                Some(5000.0),
                Some(date(2026, 3, 10)),
            ))
            .await
            .unwrap();
        store
            .insert(&customer(
                "早期客户",
                "张伟",
                "销售一部",
                true,
                Some(9000.0),
                Some(date(2025, 1, 5)),
            ))
            .await
            .unwrap();

        let service = service(store).await;
        let mut cfg = config(EntityType::Customers);
        cfg.range = ExportRange::Custom;
        cfg.date_range = Some(DateRange {
            start: date(2026, 1, 1),
            end: date(2026, 12, 31),
        });

        let table = service
            .select(
                &operator(Role::Admin, "管理员", None),
                &cfg,
                date(2026, 8, 6),
            )
            .await
            .unwrap();
        assert_eq!(table.rows.len(), 1);

        // Custom range without a date range is a validation error.
        cfg.date_range = None;
        let err = service
            .select(
                &operator(Role::Admin, "管理员", None),
                &cfg,
                date(2026, 8, 6),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_salesperson_performance_department_and_month() {
        let store = Arc::new(MemoryRecordStore::new());
        store.insert(&salesperson("张伟", "销售一部")).await.unwrap();
        store.insert(&salesperson("李娜", "销售二部")).await.unwrap();

        // In-month deal for 张伟, out-of-month deal that must not count.
        store
            .insert(&customer(
                "本月成交",
                "张伟",
                "销售一部",
                true,
                Some(12000.0),
                Some(date(2026, 8, 3)),
            ))
            .await
            .unwrap();
        store
            .insert(&customer(
                "上月成交",
                "张伟",
                "销售一部",
                true,
                Some(99999.0),
                Some(date(2026, 7, 20)),
            ))
            .await
            .unwrap();

        let service = service(store).await;
        let mut cfg = config(EntityType::SalespersonPerformance);
        cfg.filters
            .insert("department".to_string(), "销售一部".to_string());
        cfg.filters
            .insert("time_range".to_string(), "本月".to_string());

        let table = service
            .select(
                &operator(Role::Admin, "管理员", None),
                &cfg,
                date(2026, 8, 6),
            )
            .await
            .unwrap();

        assert_eq!(table.rows.len(), 1);
        let col = |key: &str| table.fields.iter().position(|f| f.key == key).unwrap();
        assert_eq!(table.rows[0][col("department")], "销售一部");
        assert_eq!(table.rows[0][col("salesperson")], "张伟");
        assert_eq!(table.rows[0][col("signed_count")], "1");
        assert_eq!(table.rows[0][col("revenue")], "12000");
        assert_eq!(table.rows[0][col("conversion_rate")], "100.0%");
    }

    #[tokio::test]
    async fn test_course_performance_aggregates_sessions() {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .insert(&EntityRecord::Course(Course {
                code: Some("LD-101".to_string()),
                name: "高管领导力".to_string(),
                module: "领导力".to_string(),
                duration_days: 3,
                sessions_per_year: 6,
                price: Some(1000.0),
                instructor: None,
                on_shelf: true,
                description: None,
            }))
            .await
            .unwrap();

        for (start, status, enrolled) in [
            (date(2026, 2, 1), "已结课", 20),
            (date(2026, 5, 1), "报名中", 10),
        ] {
            store
                .insert(&EntityRecord::TrainingSession(TrainingSession {
                    course_code: "LD-101".to_string(),
                    course_name: None,
                    start_date: start,
                    end_date: None,
                    location: None,
                    expert_name: None,
                    capacity: Some(30),
                    enrolled: Some(enrolled),
                    status: Some(status.to_string()),
                }))
                .await
                .unwrap();
        }

        let service = service(store).await;
        let mut cfg = config(EntityType::CourseSalesPerformance);
        cfg.filters
            .insert("time_range".to_string(), "本年度".to_string());

        let table = service
            .select(
                &operator(Role::Admin, "管理员", None),
                &cfg,
                date(2026, 8, 6),
            )
            .await
            .unwrap();

        assert_eq!(table.rows.len(), 1);
        let col = |key: &str| table.fields.iter().position(|f| f.key == key).unwrap();
        assert_eq!(table.rows[0][col("session_count")], "2");
        assert_eq!(table.rows[0][col("completed_sessions")], "1");
        assert_eq!(table.rows[0][col("total_enrolled")], "30");
        assert_eq!(table.rows[0][col("revenue")], "30000");
    }

    #[tokio::test]
    async fn test_export_records_history_entry() {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .insert(&customer("客户A", "张伟", "销售一部", false, None, None))
            .await
            .unwrap();

        let pool = connect_memory().await.unwrap();
        let history = Arc::new(HistoryService::new(pool));
        let service = ExportService::new(store, Arc::new(RosterCache::new()), history.clone());

        let file = service
            .export(
                &operator(Role::Admin, "管理员", None),
                &config(EntityType::Customers),
                date(2026, 8, 6),
            )
            .await
            .unwrap();

        assert_eq!(file.file_name, "customers_20260806.csv");
        assert!(!file.bytes.is_empty());

        let records = history.list(20, 90).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation_type, OperationType::Export);
        assert_eq!(records[0].record_count, 1);
    }

    #[tokio::test]
    async fn test_missing_export_permission_short_circuits() {
        let service = service(Arc::new(MemoryRecordStore::new())).await;
        let mut viewer = operator(Role::Admin, "访客", None);
        viewer.permissions = vec!["data:import".to_string()];

        let err = service
            .select(&viewer, &config(EntityType::Customers), date(2026, 8, 6))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionError(_)));
    }
}
