//! Upload template generator.
//!
//! Emits a blank workbook with the registry's columns: localized header
//! (required columns marked with `*`), per-column dropdown constraints for
//! enumerated fields, registry column widths and one example row. The two
//! performance views have no import schema and are rejected.

use rust_xlsxwriter::{DataValidation, Format, Workbook};

use crate::application::use_cases::schema_registry::{import_fields_for, FieldDefinition, FieldKind};
use crate::domain::entity::EntityType;
use crate::domain::error::{AppError, Result};

/// Dropdown constraints cover this many data rows below the header.
const TEMPLATE_ROWS: u32 = 500;

pub fn generate(entity: EntityType) -> Result<Vec<u8>> {
    if !entity.supports_import() {
        return Err(AppError::ValidationError(format!(
            "{} 为导出视图, 不支持生成导入模板",
            entity.display_name()
        )));
    }

    let fields = import_fields_for(entity);
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(&format!("{}导入模板", entity.display_name()))
        .map_err(|e| AppError::Internal(format!("无法命名工作表: {}", e)))?;

    let header_format = Format::new().set_bold();

    for (col, field) in fields.iter().enumerate() {
        let col = col as u16;
        let header = if field.required {
            format!("{}*", field.label)
        } else {
            field.label.to_string()
        };
        worksheet
            .write_string_with_format(0, col, &header, &header_format)
            .map_err(|e| AppError::Internal(format!("写入表头失败: {}", e)))?;
        worksheet
            .set_column_width(col, field.width as f64)
            .map_err(|e| AppError::Internal(format!("设置列宽失败: {}", e)))?;

        if !field.options.is_empty() {
            let validation = DataValidation::new()
                .allow_list_strings(field.options)
                .map_err(|e| AppError::Internal(format!("生成下拉约束失败: {}", e)))?;
            worksheet
                .add_data_validation(1, col, TEMPLATE_ROWS, col, &validation)
                .map_err(|e| AppError::Internal(format!("应用下拉约束失败: {}", e)))?;
        }

        worksheet
            .write_string(1, col, &sample_value(field))
            .map_err(|e| AppError::Internal(format!("写入示例行失败: {}", e)))?;
    }

    workbook
        .save_to_buffer()
        .map_err(|e| AppError::Internal(format!("生成模板失败: {}", e)))
}

fn sample_value(field: &FieldDefinition) -> String {
    match field.kind {
        FieldKind::Enum | FieldKind::Bool => field
            .options
            .first()
            .map(|s| s.to_string())
            .unwrap_or_default(),
        FieldKind::Integer => "1".to_string(),
        FieldKind::Decimal => "1000".to_string(),
        FieldKind::Date => "2026-01-01".to_string(),
        FieldKind::Text => format!("示例{}", field.label),
    }
}
