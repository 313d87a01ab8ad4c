//! Spreadsheet codec.
//!
//! Decodes uploaded `.xlsx` / `.csv` bytes into [`ImportRow`]s keyed by
//! recognized column labels, and encodes export tables back into
//! downloadable bytes. Failure modes (unreadable binary, empty sheet,
//! row-count overflow) fail the whole parse; no partial result escapes.

mod csv;
mod encode;
mod xlsx;

pub use encode::{encode, encode_csv, encode_xlsx};

use crate::application::use_cases::schema_registry::{match_header, FieldDefinition};
use crate::domain::entity::EntityType;
use crate::domain::error::{AppError, Result};
use crate::domain::import::{ImportRow, ValidationIssue};
use crate::infrastructure::config::{MAX_IMPORT_RECORDS, MAX_UPLOAD_SIZE};

/// Result of decoding one upload: the parsed rows plus sheet-level notes
/// (unrecognized columns are dropped with a warning, never an error).
#[derive(Debug, Clone)]
pub struct ParsedUpload {
    pub rows: Vec<ImportRow>,
    pub notes: Vec<ValidationIssue>,
}

/// Rows of one export rendition, already scoped/filtered/projected.
/// `fields` carries the registry definitions in projection order.
#[derive(Debug, Clone)]
pub struct ExportTable {
    pub title: String,
    pub fields: Vec<&'static FieldDefinition>,
    pub rows: Vec<Vec<String>>,
}

pub fn parse_upload(entity: EntityType, file_name: &str, bytes: &[u8]) -> Result<ParsedUpload> {
    parse_upload_with_limit(entity, file_name, bytes, MAX_IMPORT_RECORDS)
}

/// Same as [`parse_upload`] with an explicit row cap; the cap is a
/// parameter so the overflow guard stays testable without 50k-row files.
pub fn parse_upload_with_limit(
    entity: EntityType,
    file_name: &str,
    bytes: &[u8],
    max_records: usize,
) -> Result<ParsedUpload> {
    if !entity.supports_import() {
        return Err(AppError::ValidationError(format!(
            "{} 不支持导入",
            entity.display_name()
        )));
    }
    if bytes.len() > MAX_UPLOAD_SIZE {
        return Err(AppError::ParseError(format!(
            "文件大小 {} 字节超过上限 {} 字节",
            bytes.len(),
            MAX_UPLOAD_SIZE
        )));
    }

    match file_extension(file_name).as_deref() {
        Some("xlsx") => xlsx::parse_xlsx(bytes, entity, max_records),
        Some("csv") => csv::parse_csv(bytes, entity, max_records),
        _ => Err(AppError::ParseError(format!(
            "不支持的文件格式: {} (仅支持 .xlsx / .csv)",
            file_name
        ))),
    }
}

fn file_extension(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Map raw header cells onto field definitions. Unmatched non-empty
/// headers yield a sheet-level warning note (row_index 0) and their
/// column is dropped from every row.
pub(super) fn map_columns(
    entity: EntityType,
    headers: &[String],
) -> (Vec<Option<&'static FieldDefinition>>, Vec<ValidationIssue>) {
    let mut columns = Vec::with_capacity(headers.len());
    let mut notes = Vec::new();

    for header in headers {
        let field = match_header(entity, header);
        if field.is_none() && !header.trim().is_empty() {
            notes.push(ValidationIssue::warning(
                0,
                header.trim(),
                format!("未识别的列 \"{}\", 该列已被忽略", header.trim()),
            ));
        }
        columns.push(field);
    }

    (columns, notes)
}

/// Assemble one ImportRow from positional cell texts. Returns `None` for
/// rows whose recognized cells are all empty (fully blank filler rows).
pub(super) fn build_row(
    row_index: usize,
    columns: &[Option<&'static FieldDefinition>],
    cells: &[String],
) -> Option<ImportRow> {
    let mut row = ImportRow::new(row_index);
    let mut any_value = false;

    for (field, cell) in columns.iter().zip(cells.iter()) {
        if let Some(field) = field {
            if !cell.trim().is_empty() {
                any_value = true;
            }
            row.values.insert(field.key.to_string(), cell.clone());
        }
    }

    if any_value {
        Some(row)
    } else {
        None
    }
}
