use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::amount::Amount;
use super::cell::{self, RowError, SheetRow};

pub const HEADERS: [&str; 13] = [
    "telegram_id",
    "username",
    "name",
    "phone",
    "schedule",
    "registration_date",
    "total_sessions",
    "current_sessions",
    "last_payment_date",
    "last_payment_amount",
    "next_payment_due",
    "status",
    "notes",
];

/// 1-based column positions in the members sheet
pub mod columns {
    pub const TELEGRAM_ID: usize = 1;
    pub const USERNAME: usize = 2;
    pub const NAME: usize = 3;
    pub const PHONE: usize = 4;
    pub const SCHEDULE: usize = 5;
    pub const REGISTRATION_DATE: usize = 6;
    pub const LAST_PAYMENT_DATE: usize = 9;
    pub const LAST_PAYMENT_AMOUNT: usize = 10;
    pub const STATUS: usize = 12;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Inactive,
}

impl MemberStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberStatus::Active => "active",
            MemberStatus::Inactive => "inactive",
        }
    }

    /// Anything other than an explicit "inactive" counts as active, which is
    /// what a freshly hand-edited row without a status means.
    pub fn from_cell(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "inactive" | "неактивный" => MemberStatus::Inactive,
            _ => MemberStatus::Active,
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Member {
    pub id: i64,
    pub username: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub schedule: Option<String>,
    pub registration_date: Option<NaiveDate>,
    pub status: MemberStatus,
    pub last_payment_date: Option<NaiveDate>,
    pub last_payment_amount: Option<Amount>,
    /// Sheet row holding this member
    pub row: u32,
}

impl Member {
    pub fn from_row(row: &SheetRow) -> Result<Self, RowError> {
        let id = row.required_i64(columns::TELEGRAM_ID, "telegram_id")?;

        let last_payment_amount = match row.cell(columns::LAST_PAYMENT_AMOUNT) {
            c if cell::is_blank(c) => None,
            c => Some(Amount::from_cell(c).map_err(|e| RowError::Invalid {
                row: row.index,
                field: "last_payment_amount",
                reason: e.to_string(),
            })?),
        };

        Ok(Self {
            id,
            username: row.optional_text(columns::USERNAME),
            name: row
                .optional_text(columns::NAME)
                .unwrap_or_else(|| format!("#{}", id)),
            phone: row.optional_text(columns::PHONE),
            schedule: row.optional_text(columns::SCHEDULE),
            registration_date: cell::date(row.cell(columns::REGISTRATION_DATE)),
            status: MemberStatus::from_cell(&row.text(columns::STATUS)),
            last_payment_date: cell::date(row.cell(columns::LAST_PAYMENT_DATE)),
            last_payment_amount,
            row: row.index,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct NewMember {
    pub id: i64,
    pub username: Option<String>,
    pub name: String,
    pub phone: String,
    pub schedule: String,
}

impl NewMember {
    pub fn to_row(&self, registered_on: NaiveDate) -> Vec<Value> {
        vec![
            Value::from(self.id),
            Value::from(self.username.clone().unwrap_or_default()),
            Value::from(self.name.clone()),
            Value::from(self.phone.clone()),
            Value::from(self.schedule.clone()),
            Value::from(cell::format_date(registered_on)),
            Value::from(0),
            Value::from(0),
            Value::from(""),
            Value::from(""),
            Value::from(""),
            Value::from(MemberStatus::Active.as_str()),
            Value::from(""),
        ]
    }
}
