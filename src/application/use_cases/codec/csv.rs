use csv::{ReaderBuilder, Trim};

use super::{build_row, map_columns, ParsedUpload};
use crate::domain::entity::EntityType;
use crate::domain::error::{AppError, Result};

pub(super) fn parse_csv(
    bytes: &[u8],
    entity: EntityType,
    max_records: usize,
) -> Result<ParsedUpload> {
    let content = decode_text(bytes);

    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AppError::ParseError(format!("无法读取 CSV 表头: {}", e)))?
        .clone();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(AppError::ParseError("CSV 文件为空".to_string()));
    }

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let (columns, notes) = map_columns(entity, &header_cells);

    let mut rows = Vec::new();
    let mut data_rows = 0usize;

    for (offset, result) in reader.records().enumerate() {
        let record = result
            .map_err(|e| AppError::ParseError(format!("CSV 第 {} 行解析失败: {}", offset + 2, e)))?;

        data_rows += 1;
        if data_rows > max_records {
            // The whole parse fails; nothing collected so far is exposed.
            return Err(AppError::ParseError(format!(
                "数据行数超过上限 {}",
                max_records
            )));
        }

        let cells: Vec<String> = (0..columns.len())
            .map(|idx| record.get(idx).unwrap_or("").to_string())
            .collect();
        if let Some(row) = build_row(offset + 1, &columns, &cells) {
            rows.push(row);
        }
    }

    Ok(ParsedUpload { rows, notes })
}

/// Decode upload bytes to text: BOM-stripped UTF-8 first, then GBK (the
/// common encoding for Chinese spreadsheets), finally lossy UTF-8.
fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    if let Ok(content) = std::str::from_utf8(bytes) {
        return content.to_string();
    }

    let (decoded, _, had_errors) = encoding_rs::GBK.decode(bytes);
    if !had_errors {
        return decoded.into_owned();
    }

    String::from_utf8_lossy(bytes).to_string()
}
