use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::cell::{self, RowError, SheetRow};

pub const HEADERS: [&str; 7] = [
    "date",
    "name",
    "telegram_id",
    "status",
    "reason",
    "session_number",
    "payment_period",
];

pub mod columns {
    pub const DATE: usize = 1;
    pub const NAME: usize = 2;
    pub const TELEGRAM_ID: usize = 3;
    pub const STATUS: usize = 4;
    pub const REASON: usize = 5;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Attended,
    Sick,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Attended => "attended",
            AttendanceStatus::Sick => "sick",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "attended" => Some(AttendanceStatus::Attended),
            "sick" => Some(AttendanceStatus::Sick),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceEvent {
    pub date: NaiveDate,
    pub member_id: i64,
    pub member_name: String,
    pub status: AttendanceStatus,
    pub reason: Option<String>,
}

impl AttendanceEvent {
    pub fn from_row(row: &SheetRow) -> Result<Self, RowError> {
        let member_id = row.required_i64(columns::TELEGRAM_ID, "telegram_id")?;
        let date = cell::date(row.cell(columns::DATE)).ok_or(RowError::Invalid {
            row: row.index,
            field: "date",
            reason: format!("unparsable date {}", row.cell(columns::DATE)),
        })?;
        let status_text = row.text(columns::STATUS);
        let status = AttendanceStatus::parse(&status_text).ok_or_else(|| RowError::Invalid {
            row: row.index,
            field: "status",
            reason: format!("unknown attendance status {:?}", status_text),
        })?;

        Ok(Self {
            date,
            member_id,
            member_name: row.text(columns::NAME),
            status,
            reason: row.optional_text(columns::REASON),
        })
    }

    pub fn to_row(&self) -> Vec<Value> {
        vec![
            Value::from(cell::format_date(self.date)),
            Value::from(self.member_name.clone()),
            Value::from(self.member_id),
            Value::from(self.status.as_str()),
            Value::from(self.reason.clone().unwrap_or_default()),
            Value::from(""),
            Value::from(""),
        ]
    }
}

/// Sessions attended strictly after the member's last confirmed payment, or
/// all attended sessions when the member has never paid.
pub fn sessions_since(
    events: &[AttendanceEvent],
    member_id: i64,
    last_payment: Option<NaiveDate>,
) -> u32 {
    let count = events
        .iter()
        .filter(|e| e.member_id == member_id && e.status == AttendanceStatus::Attended)
        .filter(|e| last_payment.map_or(true, |paid| e.date > paid))
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}
