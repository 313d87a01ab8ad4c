use rust_xlsxwriter::{Format, Workbook};

use super::ExportTable;
use crate::domain::error::{AppError, Result};
use crate::domain::export::ExportFormat;

/// Encode an export table in the requested format. PDF export hands CSV
/// bytes to the rendering collaborator, which owns the actual layout.
pub fn encode(table: &ExportTable, format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Xlsx => encode_xlsx(table),
        ExportFormat::Csv | ExportFormat::Pdf => Ok(encode_csv(table)),
    }
}

/// CSV rendition with a UTF-8 BOM so Excel opens Chinese headers intact.
pub fn encode_csv(table: &ExportTable) -> Vec<u8> {
    let mut out = vec![0xEF, 0xBB, 0xBF];

    let mut writer = csv::Writer::from_writer(Vec::new());
    let labels: Vec<&str> = table.fields.iter().map(|f| f.label).collect();
    // Writing to Vec<u8> cannot fail.
    let _ = writer.write_record(&labels);
    for row in &table.rows {
        let _ = writer.write_record(row);
    }
    let _ = writer.flush();

    out.extend(writer.into_inner().unwrap_or_default());
    out
}

pub fn encode_xlsx(table: &ExportTable) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(&table.title)
        .map_err(|e| AppError::Internal(format!("无法命名工作表: {}", e)))?;

    let header_format = Format::new().set_bold();

    for (col, field) in table.fields.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, field.label, &header_format)
            .map_err(|e| AppError::Internal(format!("写入表头失败: {}", e)))?;
        worksheet
            .set_column_width(col as u16, field.width as f64)
            .map_err(|e| AppError::Internal(format!("设置列宽失败: {}", e)))?;
    }

    for (row_idx, row) in table.rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            worksheet
                .write_string((row_idx + 1) as u32, col as u16, value)
                .map_err(|e| {
                    AppError::Internal(format!("写入第 {} 行失败: {}", row_idx + 2, e))
                })?;
        }
    }

    workbook
        .save_to_buffer()
        .map_err(|e| AppError::Internal(format!("生成 Excel 文件失败: {}", e)))
}
