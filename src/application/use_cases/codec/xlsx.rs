use std::io::Cursor;

use calamine::{Data, DataType, Reader, Xlsx};

use super::{build_row, map_columns, ParsedUpload};
use crate::application::use_cases::schema_registry::{FieldDefinition, FieldKind};
use crate::domain::entity::EntityType;
use crate::domain::error::{AppError, Result};

pub(super) fn parse_xlsx(
    bytes: &[u8],
    entity: EntityType,
    max_records: usize,
) -> Result<ParsedUpload> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| AppError::ParseError(format!("无法读取 Excel 文件: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::ParseError("Excel 文件中没有工作表".to_string()))?
        .map_err(|e| AppError::ParseError(format!("无法读取工作表: {}", e)))?;

    let mut sheet_rows = range.rows();
    let header_row = sheet_rows
        .next()
        .ok_or_else(|| AppError::ParseError("工作表为空".to_string()))?;

    // Row-count gate before any data row is materialized.
    let data_rows = range.height().saturating_sub(1);
    if data_rows > max_records {
        return Err(AppError::ParseError(format!(
            "数据行数 {} 超过上限 {}",
            data_rows, max_records
        )));
    }

    let headers: Vec<String> = header_row.iter().map(|cell| plain_text(cell)).collect();
    let (columns, notes) = map_columns(entity, &headers);

    let mut rows = Vec::new();
    for (offset, sheet_row) in sheet_rows.enumerate() {
        let cells: Vec<String> = sheet_row
            .iter()
            .enumerate()
            .map(|(col, cell)| cell_text(cell, columns.get(col).copied().flatten()))
            .collect();
        if let Some(row) = build_row(offset + 1, &columns, &cells) {
            rows.push(row);
        }
    }

    Ok(ParsedUpload { rows, notes })
}

/// Render one cell to text. Date-kind columns read native Excel datetime
/// cells as ISO dates so they survive the string pipeline.
fn cell_text(cell: &Data, field: Option<&'static FieldDefinition>) -> String {
    if let Some(field) = field {
        if field.kind == FieldKind::Date {
            if let Some(dt) = cell.as_datetime() {
                return dt.date().format("%Y-%m-%d").to_string();
            }
        }
    }
    plain_text(cell)
}

fn plain_text(cell: &Data) -> String {
    cell.as_string()
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("{}", cell))
}
