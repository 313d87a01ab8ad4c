use crate::domain::entity::EntityType;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Xlsx,
    Csv,
    /// CSV bytes handed to the PDF rendering collaborator.
    Pdf,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }
}

/// Export scope selector applied before entity filters and projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportRange {
    All,
    Filtered,
    Custom,
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Relative time buckets offered by the performance-view filters, resolved
/// against a caller-supplied reference date so boundaries stay deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    ThisMonth,
    LastMonth,
    ThisQuarter,
    LastQuarter,
    ThisYear,
    LastYear,
}

impl TimeBucket {
    pub fn from_label(label: &str) -> Option<TimeBucket> {
        match label.trim() {
            "本月" => Some(TimeBucket::ThisMonth),
            "上月" => Some(TimeBucket::LastMonth),
            "本季度" => Some(TimeBucket::ThisQuarter),
            "上季度" => Some(TimeBucket::LastQuarter),
            "本年度" => Some(TimeBucket::ThisYear),
            "去年" => Some(TimeBucket::LastYear),
            _ => None,
        }
    }

    pub fn resolve(&self, today: NaiveDate) -> DateRange {
        match self {
            TimeBucket::ThisMonth => month_range(today.year(), today.month()),
            TimeBucket::LastMonth => {
                let (year, month) = previous_month(today.year(), today.month());
                month_range(year, month)
            }
            TimeBucket::ThisQuarter => quarter_range(today.year(), quarter_of(today.month())),
            TimeBucket::LastQuarter => {
                let (year, quarter) = previous_quarter(today.year(), quarter_of(today.month()));
                quarter_range(year, quarter)
            }
            TimeBucket::ThisYear => year_range(today.year()),
            TimeBucket::LastYear => year_range(today.year() - 1),
        }
    }
}

fn quarter_of(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn previous_quarter(year: i32, quarter: u32) -> (i32, u32) {
    if quarter == 1 {
        (year - 1, 4)
    } else {
        (year, quarter - 1)
    }
}

fn month_range(year: i32, month: u32) -> DateRange {
    let start = NaiveDate::from_ymd_opt(year, month, 1).expect("valid first of month");
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("valid first of month")
        .pred_opt()
        .expect("month start has a predecessor");
    DateRange { start, end }
}

fn quarter_range(year: i32, quarter: u32) -> DateRange {
    let first_month = (quarter - 1) * 3 + 1;
    let start = month_range(year, first_month).start;
    let end = month_range(year, first_month + 2).end;
    DateRange { start, end }
}

fn year_range(year: i32) -> DateRange {
    DateRange {
        start: NaiveDate::from_ymd_opt(year, 1, 1).expect("valid new year"),
        end: NaiveDate::from_ymd_opt(year, 12, 31).expect("valid year end"),
    }
}

/// One export invocation's configuration.
///
/// `selected_fields` empty means "all exportable fields of the entity";
/// `filters` carries entity-specific filter values keyed by field key, plus
/// `time_range` for the performance views.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExportConfig {
    pub entity_type: EntityType,
    pub format: ExportFormat,
    pub range: ExportRange,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    #[validate(length(max = 64))]
    pub selected_fields: Vec<String>,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_this_month_boundaries() {
        let range = TimeBucket::ThisMonth.resolve(date(2026, 2, 14));
        assert_eq!(range.start, date(2026, 2, 1));
        assert_eq!(range.end, date(2026, 2, 28));
        assert!(range.contains(date(2026, 2, 1)));
        assert!(!range.contains(date(2026, 3, 1)));
    }

    #[test]
    fn test_last_month_wraps_year() {
        let range = TimeBucket::LastMonth.resolve(date(2026, 1, 5));
        assert_eq!(range.start, date(2025, 12, 1));
        assert_eq!(range.end, date(2025, 12, 31));
    }

    #[test]
    fn test_quarter_boundaries() {
        let range = TimeBucket::ThisQuarter.resolve(date(2026, 8, 6));
        assert_eq!(range.start, date(2026, 7, 1));
        assert_eq!(range.end, date(2026, 9, 30));

        let last = TimeBucket::LastQuarter.resolve(date(2026, 2, 10));
        assert_eq!(last.start, date(2025, 10, 1));
        assert_eq!(last.end, date(2025, 12, 31));
    }

    #[test]
    fn test_year_buckets() {
        let range = TimeBucket::ThisYear.resolve(date(2026, 8, 6));
        assert_eq!(range.start, date(2026, 1, 1));
        assert_eq!(range.end, date(2026, 12, 31));

        let last = TimeBucket::LastYear.resolve(date(2026, 8, 6));
        assert_eq!(last.start, date(2025, 1, 1));
        assert_eq!(last.end, date(2025, 12, 31));
    }

    #[test]
    fn test_bucket_labels() {
        assert_eq!(TimeBucket::from_label("本月"), Some(TimeBucket::ThisMonth));
        assert_eq!(TimeBucket::from_label(" 去年 "), Some(TimeBucket::LastYear));
        assert_eq!(TimeBucket::from_label("前天"), None);
    }
}
