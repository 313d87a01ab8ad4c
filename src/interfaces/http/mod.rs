use actix_cors::Cors;
use actix_web::{dev::Server, get, post, web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use validator::Validate;

use crate::application::use_cases::template_generator;
use crate::domain::entity::{EntityType, Operator, Role};
use crate::domain::error::AppError;
use crate::domain::export::ExportConfig;
use crate::domain::import::DuplicateStrategy;
use crate::infrastructure::config::{
    HISTORY_LIMIT, HISTORY_RETENTION_DAYS, MAX_UPLOAD_SIZE,
};
use crate::interfaces::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub source: String,
    pub message: String,
}

pub struct HttpState {
    pub app: Arc<AppState>,
    pub logs: Arc<Mutex<Vec<LogEntry>>>,
}

/// Operator identity as asserted by the session gateway in request headers.
/// UTF-8 header values are accepted so Chinese operator names survive.
fn operator_from_headers(req: &HttpRequest) -> Result<Operator, AppError> {
    let header = |name: &str| -> Option<String> {
        req.headers()
            .get(name)
            .and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let id = header("x-operator-id")
        .ok_or_else(|| AppError::PermissionError("缺少操作员标识".to_string()))?;
    let name = header("x-operator-name").unwrap_or_else(|| id.clone());
    let role = header("x-operator-role")
        .and_then(|r| Role::from_key(&r))
        .ok_or_else(|| AppError::PermissionError("缺少或无法识别操作员角色".to_string()))?;
    let department = header("x-operator-department");
    let permissions = header("x-operator-permissions")
        .map(|raw| {
            raw.split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(Operator {
        id,
        name,
        role,
        department,
        permissions,
    })
}

fn entity_from_path(raw: &str) -> Result<EntityType, AppError> {
    EntityType::from_key(raw)
        .ok_or_else(|| AppError::ValidationError(format!("未知的数据类型: {}", raw)))
}

fn error_response(err: &AppError) -> HttpResponse {
    match err {
        AppError::PermissionError(_) => HttpResponse::Forbidden().json(err),
        AppError::NotFound(_) => HttpResponse::NotFound().json(err),
        AppError::ValidationError(_) | AppError::ParseError(_) => {
            HttpResponse::BadRequest().json(err)
        }
        _ => HttpResponse::InternalServerError().json(err),
    }
}

#[derive(Deserialize)]
struct PreviewQuery {
    file_name: String,
}

#[post("/import/{entity}/preview")]
async fn import_preview(
    data: web::Data<HttpState>,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<PreviewQuery>,
    body: web::Bytes,
) -> impl Responder {
    let result = async {
        let operator = operator_from_headers(&req)?;
        let entity = entity_from_path(&path)?;
        data.app
            .import_executor
            .prepare(&operator, entity, &query.file_name, &body)
            .await
    }
    .await;

    match result {
        Ok(preview) => {
            add_log(
                &data.logs,
                "INFO",
                "Import",
                &format!(
                    "Prepared {} ({} rows, phase {:?})",
                    query.file_name, preview.total_rows, preview.phase
                ),
            );
            HttpResponse::Ok().json(preview)
        }
        Err(e) => {
            add_log(
                &data.logs,
                "ERROR",
                "Import",
                &format!("Preview of {} failed: {}", query.file_name, e),
            );
            error_response(&e)
        }
    }
}

#[derive(Deserialize)]
struct CommitRequest {
    ticket: Uuid,
    strategy: DuplicateStrategy,
}

#[post("/import/commit")]
async fn import_commit(
    data: web::Data<HttpState>,
    req: HttpRequest,
    payload: web::Json<CommitRequest>,
) -> impl Responder {
    let result = async {
        let operator = operator_from_headers(&req)?;
        data.app
            .import_executor
            .commit(&operator, payload.ticket, payload.strategy)
            .await
    }
    .await;

    match result {
        Ok(report) => {
            add_log(
                &data.logs,
                "INFO",
                "Import",
                &format!(
                    "Committed {}: success={}, failed={}, skipped={}",
                    payload.ticket,
                    report.summary.success,
                    report.summary.failed,
                    report.summary.skipped
                ),
            );
            HttpResponse::Ok().json(report)
        }
        Err(e) => {
            add_log(
                &data.logs,
                "ERROR",
                "Import",
                &format!("Commit of {} failed: {}", payload.ticket, e),
            );
            error_response(&e)
        }
    }
}

#[derive(Deserialize)]
struct DiscardRequest {
    ticket: Uuid,
}

#[derive(Serialize)]
struct DiscardResponse {
    discarded: bool,
}

#[post("/import/discard")]
async fn import_discard(
    data: web::Data<HttpState>,
    payload: web::Json<DiscardRequest>,
) -> impl Responder {
    let discarded = data.app.import_executor.discard(payload.ticket);
    HttpResponse::Ok().json(DiscardResponse { discarded })
}

#[post("/export")]
async fn export(
    data: web::Data<HttpState>,
    req: HttpRequest,
    config: web::Json<ExportConfig>,
) -> impl Responder {
    let result = async {
        let operator = operator_from_headers(&req)?;
        config
            .validate()
            .map_err(|e| AppError::ValidationError(format!("导出配置无效: {}", e)))?;
        data.app
            .export_service
            .export(&operator, &config, Utc::now().date_naive())
            .await
    }
    .await;

    match result {
        Ok(file) => {
            add_log(
                &data.logs,
                "INFO",
                "Export",
                &format!("Exported {} ({} bytes)", file.file_name, file.bytes.len()),
            );
            HttpResponse::Ok()
                .content_type(file.content_type)
                .insert_header((
                    "Content-Disposition",
                    format!("attachment; filename=\"{}\"", file.file_name),
                ))
                .body(file.bytes)
        }
        Err(e) => {
            add_log(
                &data.logs,
                "ERROR",
                "Export",
                &format!("Export of {} failed: {}", config.entity_type.key(), e),
            );
            error_response(&e)
        }
    }
}

#[get("/template/{entity}")]
async fn template(data: web::Data<HttpState>, path: web::Path<String>) -> impl Responder {
    let result = entity_from_path(&path).and_then(template_generator::generate);

    match result {
        Ok(bytes) => HttpResponse::Ok()
            .content_type("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
            .insert_header((
                "Content-Disposition",
                format!("attachment; filename=\"{}_template.xlsx\"", path.as_str()),
            ))
            .body(bytes),
        Err(e) => {
            add_log(
                &data.logs,
                "ERROR",
                "Template",
                &format!("Template for {} failed: {}", path, e),
            );
            error_response(&e)
        }
    }
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

#[get("/history")]
async fn history(data: web::Data<HttpState>, query: web::Query<HistoryQuery>) -> impl Responder {
    let limit = query.limit.unwrap_or(HISTORY_LIMIT as i64);
    match data.app.history.list(limit, HISTORY_RETENTION_DAYS).await {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(e) => {
            add_log(
                &data.logs,
                "ERROR",
                "History",
                &format!("History listing failed: {}", e),
            );
            error_response(&e)
        }
    }
}

#[get("/history/stats")]
async fn history_stats(data: web::Data<HttpState>) -> impl Responder {
    match data.app.history.stats(HISTORY_RETENTION_DAYS).await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => error_response(&e),
    }
}

#[post("/history/purge")]
async fn history_purge(data: web::Data<HttpState>, req: HttpRequest) -> impl Responder {
    let result = async {
        let operator = operator_from_headers(&req)?;
        if operator.role != Role::Admin {
            return Err(AppError::PermissionError(
                "仅管理员可清理操作历史".to_string(),
            ));
        }
        data.app.history.clear_older_than(HISTORY_RETENTION_DAYS).await
    }
    .await;

    match result {
        Ok(deleted) => {
            add_log(
                &data.logs,
                "INFO",
                "History",
                &format!("Purged {} stale history entries", deleted),
            );
            HttpResponse::Ok().json(serde_json::json!({ "deleted": deleted }))
        }
        Err(e) => error_response(&e),
    }
}

#[get("/logs")]
async fn get_logs(data: web::Data<HttpState>) -> impl Responder {
    let logs = data.logs.lock().unwrap();
    HttpResponse::Ok().json(&*logs)
}

pub fn add_log(logs: &Mutex<Vec<LogEntry>>, level: &str, source: &str, message: &str) {
    let entry = LogEntry {
        time: Local::now().format("%H:%M:%S").to_string(),
        level: level.to_string(),
        source: source.to_string(),
        message: message.to_string(),
    };
    let mut logs = logs.lock().unwrap();
    logs.push(entry);
    if logs.len() > 100 {
        logs.remove(0);
    }
}

pub fn start_server(
    app: Arc<AppState>,
    logs: Arc<Mutex<Vec<LogEntry>>>,
    bind_address: &str,
    port: u16,
) -> std::io::Result<Server> {
    let state = web::Data::new(HttpState { app, logs });

    let server = HttpServer::new(move || {
        let cors = Cors::permissive(); // Local console backend behind the gateway

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(MAX_UPLOAD_SIZE + 4096))
            .service(
                web::scope("/api")
                    .service(import_preview)
                    .service(import_commit)
                    .service(import_discard)
                    .service(export)
                    .service(template)
                    .service(history)
                    .service(history_stats)
                    .service(history_purge)
                    .service(get_logs),
            )
    })
    .bind((bind_address, port))?
    .run();

    Ok(server)
}
