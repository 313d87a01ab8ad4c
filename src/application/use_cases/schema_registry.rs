// Centralized per-entity field definitions for import/export.
//
// Goal: keep column labels, required flags, coercion kinds and option lists
// in one place instead of scattering them across codec/validator/exporter.

use crate::domain::entity::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    Date,
    Bool,
    Enum,
}

/// One column of an entity sheet. `'static` data owned by this registry;
/// immutable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub kind: FieldKind,
    pub options: &'static [&'static str],
    pub width: u16,
}

pub const BOOL_OPTIONS: &[&str] = &["是", "否"];

pub const COURSE_FIELDS: &[FieldDefinition] = &[
    FieldDefinition { key: "code", label: "课程编码", required: false, kind: FieldKind::Text, options: &[], width: 14 },
    FieldDefinition { key: "name", label: "课程名称", required: true, kind: FieldKind::Text, options: &[], width: 24 },
    FieldDefinition { key: "module", label: "课程模块", required: true, kind: FieldKind::Enum, options: &["领导力", "通用管理", "专业技能", "职业素养"], width: 14 },
    FieldDefinition { key: "duration_days", label: "学制天数", required: true, kind: FieldKind::Integer, options: &[], width: 10 },
    FieldDefinition { key: "sessions_per_year", label: "年开班次数", required: true, kind: FieldKind::Integer, options: &[], width: 12 },
    FieldDefinition { key: "price", label: "课程定价", required: false, kind: FieldKind::Decimal, options: &[], width: 12 },
    FieldDefinition { key: "instructor", label: "授课专家", required: false, kind: FieldKind::Text, options: &[], width: 14 },
    FieldDefinition { key: "on_shelf", label: "是否上架", required: false, kind: FieldKind::Bool, options: BOOL_OPTIONS, width: 10 },
    FieldDefinition { key: "description", label: "课程简介", required: false, kind: FieldKind::Text, options: &[], width: 40 },
];

pub const EXPERT_FIELDS: &[FieldDefinition] = &[
    FieldDefinition { key: "name", label: "专家姓名", required: true, kind: FieldKind::Text, options: &[], width: 14 },
    FieldDefinition { key: "title", label: "职称", required: false, kind: FieldKind::Text, options: &[], width: 14 },
    FieldDefinition { key: "specialty", label: "擅长领域", required: false, kind: FieldKind::Text, options: &[], width: 24 },
    FieldDefinition { key: "level", label: "专家级别", required: false, kind: FieldKind::Enum, options: &["初级", "中级", "高级", "特聘"], width: 10 },
    FieldDefinition { key: "phone", label: "联系电话", required: false, kind: FieldKind::Text, options: &[], width: 16 },
    FieldDefinition { key: "email", label: "邮箱", required: false, kind: FieldKind::Text, options: &[], width: 22 },
    FieldDefinition { key: "fee_per_day", label: "日课酬", required: false, kind: FieldKind::Decimal, options: &[], width: 12 },
    FieldDefinition { key: "intro", label: "专家简介", required: false, kind: FieldKind::Text, options: &[], width: 40 },
];

pub const CUSTOMER_FIELDS: &[FieldDefinition] = &[
    FieldDefinition { key: "name", label: "客户姓名", required: true, kind: FieldKind::Text, options: &[], width: 14 },
    FieldDefinition { key: "company", label: "所在企业", required: false, kind: FieldKind::Text, options: &[], width: 24 },
    FieldDefinition { key: "position", label: "职务", required: false, kind: FieldKind::Text, options: &[], width: 14 },
    FieldDefinition { key: "phone", label: "联系电话", required: false, kind: FieldKind::Text, options: &[], width: 16 },
    FieldDefinition { key: "email", label: "邮箱", required: false, kind: FieldKind::Text, options: &[], width: 22 },
    FieldDefinition { key: "source", label: "客户来源", required: false, kind: FieldKind::Enum, options: &["网络", "转介绍", "电话营销", "展会", "其他"], width: 12 },
    FieldDefinition { key: "intent_level", label: "意向等级", required: false, kind: FieldKind::Enum, options: &["高", "中", "低"], width: 10 },
    FieldDefinition { key: "signed", label: "是否成交", required: false, kind: FieldKind::Bool, options: BOOL_OPTIONS, width: 10 },
    FieldDefinition { key: "deal_amount", label: "成交金额", required: false, kind: FieldKind::Decimal, options: &[], width: 12 },
    FieldDefinition { key: "deal_date", label: "成交日期", required: false, kind: FieldKind::Date, options: &[], width: 12 },
    FieldDefinition { key: "owner_name", label: "负责销售", required: false, kind: FieldKind::Text, options: &[], width: 12 },
    FieldDefinition { key: "department", label: "所属部门", required: false, kind: FieldKind::Text, options: &[], width: 12 },
    FieldDefinition { key: "remark", label: "备注", required: false, kind: FieldKind::Text, options: &[], width: 30 },
];

pub const SALESPERSON_FIELDS: &[FieldDefinition] = &[
    FieldDefinition { key: "name", label: "姓名", required: true, kind: FieldKind::Text, options: &[], width: 12 },
    FieldDefinition { key: "employee_no", label: "工号", required: false, kind: FieldKind::Text, options: &[], width: 10 },
    FieldDefinition { key: "department", label: "所属部门", required: true, kind: FieldKind::Text, options: &[], width: 12 },
    FieldDefinition { key: "position", label: "职位", required: false, kind: FieldKind::Enum, options: &["销售代表", "销售主管", "销售经理"], width: 12 },
    FieldDefinition { key: "phone", label: "联系电话", required: false, kind: FieldKind::Text, options: &[], width: 16 },
    FieldDefinition { key: "email", label: "邮箱", required: false, kind: FieldKind::Text, options: &[], width: 22 },
    FieldDefinition { key: "hire_date", label: "入职日期", required: false, kind: FieldKind::Date, options: &[], width: 12 },
    FieldDefinition { key: "monthly_target", label: "月度目标", required: false, kind: FieldKind::Decimal, options: &[], width: 12 },
];

pub const TRAINING_SESSION_FIELDS: &[FieldDefinition] = &[
    FieldDefinition { key: "course_code", label: "课程编码", required: true, kind: FieldKind::Text, options: &[], width: 14 },
    FieldDefinition { key: "course_name", label: "课程名称", required: false, kind: FieldKind::Text, options: &[], width: 24 },
    FieldDefinition { key: "start_date", label: "开班日期", required: true, kind: FieldKind::Date, options: &[], width: 12 },
    FieldDefinition { key: "end_date", label: "结课日期", required: false, kind: FieldKind::Date, options: &[], width: 12 },
    FieldDefinition { key: "location", label: "开班地点", required: false, kind: FieldKind::Text, options: &[], width: 16 },
    FieldDefinition { key: "expert_name", label: "授课专家", required: false, kind: FieldKind::Text, options: &[], width: 14 },
    FieldDefinition { key: "capacity", label: "计划人数", required: false, kind: FieldKind::Integer, options: &[], width: 10 },
    FieldDefinition { key: "enrolled", label: "报名人数", required: false, kind: FieldKind::Integer, options: &[], width: 10 },
    FieldDefinition { key: "status", label: "班期状态", required: false, kind: FieldKind::Enum, options: &["筹备中", "报名中", "进行中", "已结课", "已取消"], width: 10 },
];

// Export-only aggregation views. No import schema, no template.
pub const SALESPERSON_PERFORMANCE_FIELDS: &[FieldDefinition] = &[
    FieldDefinition { key: "salesperson", label: "销售姓名", required: false, kind: FieldKind::Text, options: &[], width: 12 },
    FieldDefinition { key: "department", label: "所属部门", required: false, kind: FieldKind::Text, options: &[], width: 12 },
    FieldDefinition { key: "customer_count", label: "客户数", required: false, kind: FieldKind::Integer, options: &[], width: 10 },
    FieldDefinition { key: "signed_count", label: "成交数", required: false, kind: FieldKind::Integer, options: &[], width: 10 },
    FieldDefinition { key: "conversion_rate", label: "成交转化率", required: false, kind: FieldKind::Text, options: &[], width: 12 },
    FieldDefinition { key: "revenue", label: "成交金额合计", required: false, kind: FieldKind::Decimal, options: &[], width: 14 },
];

pub const COURSE_SALES_PERFORMANCE_FIELDS: &[FieldDefinition] = &[
    FieldDefinition { key: "course_code", label: "课程编码", required: false, kind: FieldKind::Text, options: &[], width: 14 },
    FieldDefinition { key: "course_name", label: "课程名称", required: false, kind: FieldKind::Text, options: &[], width: 24 },
    FieldDefinition { key: "module", label: "课程模块", required: false, kind: FieldKind::Text, options: &[], width: 14 },
    FieldDefinition { key: "session_count", label: "开班次数", required: false, kind: FieldKind::Integer, options: &[], width: 10 },
    FieldDefinition { key: "completed_sessions", label: "已结课次数", required: false, kind: FieldKind::Integer, options: &[], width: 12 },
    FieldDefinition { key: "total_enrolled", label: "报名总人数", required: false, kind: FieldKind::Integer, options: &[], width: 12 },
    FieldDefinition { key: "revenue", label: "销售收入", required: false, kind: FieldKind::Decimal, options: &[], width: 12 },
];

/// Ordered field list of an entity's sheet. The registry has an answer for
/// every entity type; unknown types are a caller contract violation and do
/// not arise from the closed `EntityType` tag set.
pub fn fields_for(entity: EntityType) -> &'static [FieldDefinition] {
    match entity {
        EntityType::Courses => COURSE_FIELDS,
        EntityType::Experts => EXPERT_FIELDS,
        EntityType::Customers => CUSTOMER_FIELDS,
        EntityType::Salespersons => SALESPERSON_FIELDS,
        EntityType::TrainingSessions => TRAINING_SESSION_FIELDS,
        EntityType::SalespersonPerformance => SALESPERSON_PERFORMANCE_FIELDS,
        EntityType::CourseSalesPerformance => COURSE_SALES_PERFORMANCE_FIELDS,
    }
}

/// Fields accepted on upload; empty for the export-only views.
pub fn import_fields_for(entity: EntityType) -> &'static [FieldDefinition] {
    if entity.supports_import() {
        fields_for(entity)
    } else {
        &[]
    }
}

pub fn field_by_key(entity: EntityType, key: &str) -> Option<&'static FieldDefinition> {
    fields_for(entity).iter().find(|f| f.key == key)
}

pub fn label_for(entity: EntityType, key: &str) -> Option<&'static str> {
    field_by_key(entity, key).map(|f| f.label)
}

// NOTE:
// - Headers are matched against a normalized form (trimmed, lowercased
//   ASCII, quotes stripped, a trailing required marker "*" removed) so
//   re-uploads of our own templates round-trip.
pub fn normalize_header(s: &str) -> String {
    s.trim()
        .trim_matches('"')
        .trim_end_matches('*')
        .trim()
        .to_ascii_lowercase()
}

/// Resolve a worksheet header cell to a field definition by label (or by
/// key, so programmatic re-imports of exported CSVs also match).
pub fn match_header(entity: EntityType, header: &str) -> Option<&'static FieldDefinition> {
    let normalized = normalize_header(header);
    if normalized.is_empty() {
        return None;
    }
    import_fields_for(entity)
        .iter()
        .find(|f| normalize_header(f.label) == normalized || f.key == normalized)
}
