use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::Value;

static EMPTY: Value = Value::Null;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("row {row}: missing {field}")]
    Missing { row: u32, field: &'static str },

    #[error("row {row}: invalid {field}: {reason}")]
    Invalid {
        row: u32,
        field: &'static str,
        reason: String,
    },
}

/// One data row of a ledger sheet, as returned by the table store.
///
/// `index` is the 1-based sheet row number (the header occupies row 1), and is
/// the only stable reference the store offers for later cell updates.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub index: u32,
    pub cells: Vec<Value>,
}

impl SheetRow {
    pub fn new(index: u32, cells: Vec<Value>) -> Self {
        Self { index, cells }
    }

    /// Returns the cell at a 1-based column. Trailing empty cells are not sent
    /// by the store, so missing columns read as null.
    pub fn cell(&self, column: usize) -> &Value {
        column
            .checked_sub(1)
            .and_then(|i| self.cells.get(i))
            .unwrap_or(&EMPTY)
    }

    pub fn text(&self, column: usize) -> String {
        text(self.cell(column))
    }

    pub fn optional_text(&self, column: usize) -> Option<String> {
        optional_text(self.cell(column))
    }

    pub fn required_i64(&self, column: usize, field: &'static str) -> Result<i64, RowError> {
        let cell = self.cell(column);
        if is_blank(cell) {
            return Err(RowError::Missing {
                row: self.index,
                field,
            });
        }
        integer(cell).ok_or_else(|| RowError::Invalid {
            row: self.index,
            field,
            reason: format!("expected an integer, got {}", cell),
        })
    }
}

pub fn is_blank(cell: &Value) -> bool {
    match cell {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

pub fn text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

pub fn optional_text(cell: &Value) -> Option<String> {
    let value = text(cell);
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Integer cells arrive either as JSON numbers (possibly `123.0`) or as text.
pub fn integer(cell: &Value) -> Option<i64> {
    match cell {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
            compact
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    compact
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                        .map(|f| f as i64)
                })
        }
        _ => None,
    }
}

/// Dates are written as `YYYY-MM-DD` text but an operator editing the sheet by
/// hand produces spreadsheet serial numbers instead.
pub fn date(cell: &Value) -> Option<NaiveDate> {
    datetime(cell).map(|dt| dt.date())
}

pub fn datetime(cell: &Value) -> Option<NaiveDateTime> {
    match cell {
        Value::Number(n) => n.as_f64().and_then(from_serial),
        Value::String(s) => parse_datetime_text(s.trim()),
        _ => None,
    }
}

fn parse_datetime_text(s: &str) -> Option<NaiveDateTime> {
    if s.is_empty() {
        return None;
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    let date_part = s.split_whitespace().next().unwrap_or(s);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn from_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial <= 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(Duration::seconds(seconds))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FORMATS[0]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_trailing_cells_read_as_null() {
        let row = SheetRow::new(4, vec![json!("a")]);
        assert_eq!(row.cell(1), &json!("a"));
        assert_eq!(row.cell(7), &Value::Null);
        assert_eq!(row.cell(0), &Value::Null);
    }

    #[test]
    fn test_integer_accepts_numbers_and_text() {
        assert_eq!(integer(&json!(123456789)), Some(123456789));
        assert_eq!(integer(&json!(42.0)), Some(42));
        assert_eq!(integer(&json!(" 77 ")), Some(77));
        assert_eq!(integer(&json!("12.5")), None);
        assert_eq!(integer(&json!(null)), None);
    }

    #[test]
    fn test_text_renders_whole_numbers_without_fraction() {
        assert_eq!(text(&json!(8000.0)), "8000");
        assert_eq!(text(&json!(" pending ")), "pending");
        assert_eq!(optional_text(&json!("")), None);
    }

    #[test]
    fn test_dates_from_text_and_serial() {
        assert_eq!(
            date(&json!("2024-03-05")),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(
            date(&json!("2024-03-05 14:30:00")),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        // 45356 is 2024-03-05 in spreadsheet serial form
        assert_eq!(date(&json!(45356)), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(date(&json!("not a date")), None);
    }

    #[test]
    fn test_required_i64_reports_field() {
        let row = SheetRow::new(9, vec![json!("abc")]);
        let err = row.required_i64(1, "telegram_id").unwrap_err();
        assert!(matches!(err, RowError::Invalid { row: 9, field: "telegram_id", .. }));

        let row = SheetRow::new(3, vec![]);
        assert_eq!(
            row.required_i64(1, "telegram_id"),
            Err(RowError::Missing {
                row: 3,
                field: "telegram_id"
            })
        );
    }
}
