use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::amount::Amount;
use super::cell::{self, RowError, SheetRow};

pub const HEADERS: [&str; 12] = [
    "timestamp",
    "name",
    "telegram_id",
    "amount",
    "payment_type",
    "status",
    "receipt_file_id",
    "receipt_link",
    "confirmed_by",
    "confirmation_date",
    "sessions_period",
    "notes",
];

/// 1-based column positions in the payments sheet
pub mod columns {
    pub const TIMESTAMP: usize = 1;
    pub const NAME: usize = 2;
    pub const TELEGRAM_ID: usize = 3;
    pub const AMOUNT: usize = 4;
    pub const KIND: usize = 5;
    pub const STATUS: usize = 6;
    pub const RECEIPT: usize = 7;
    pub const CONFIRMED_BY: usize = 9;
    pub const CONFIRMED_AT: usize = 10;
    pub const SESSIONS: usize = 11;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimKind {
    Cash,
    Transfer,
}

impl ClaimKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimKind::Cash => "cash",
            ClaimKind::Transfer => "transfer",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ClaimKind::Cash => "Cash",
            ClaimKind::Transfer => "Transfer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Confirmed => "confirmed",
            ClaimStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ClaimStatus::Pending)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Some(ClaimStatus::Pending),
            "confirmed" => Some(ClaimStatus::Confirmed),
            "rejected" => Some(ClaimStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An admin's verdict on a pending claim. Only terminal statuses can be
/// expressed, so a claim can never be written back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Confirm,
    Reject,
}

impl Decision {
    pub fn status(self) -> ClaimStatus {
        match self {
            Decision::Confirm => ClaimStatus::Confirmed,
            Decision::Reject => ClaimStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentClaim {
    /// Sheet row, the claim's only reference in the ledger
    pub row: u32,
    pub submitted_at: Option<NaiveDateTime>,
    pub member_id: i64,
    pub member_name: String,
    pub amount: Amount,
    pub kind: ClaimKind,
    pub status: ClaimStatus,
    pub receipt_ref: Option<String>,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<NaiveDateTime>,
    pub sessions_at_submission: u32,
}

impl PaymentClaim {
    pub fn from_row(row: &SheetRow) -> Result<Self, RowError> {
        let member_id = row.required_i64(columns::TELEGRAM_ID, "telegram_id")?;

        let amount = Amount::from_cell(row.cell(columns::AMOUNT)).map_err(|e| RowError::Invalid {
            row: row.index,
            field: "amount",
            reason: e.to_string(),
        })?;

        let status_text = row.text(columns::STATUS);
        let status = ClaimStatus::parse(&status_text).ok_or_else(|| RowError::Invalid {
            row: row.index,
            field: "status",
            reason: format!("unknown status {:?}", status_text),
        })?;

        let receipt_ref = row.optional_text(columns::RECEIPT);
        let kind = match row.text(columns::KIND).to_lowercase().as_str() {
            "cash" => ClaimKind::Cash,
            "transfer" => ClaimKind::Transfer,
            _ if receipt_ref.is_some() => ClaimKind::Transfer,
            _ => ClaimKind::Cash,
        };

        Ok(Self {
            row: row.index,
            submitted_at: cell::datetime(row.cell(columns::TIMESTAMP)),
            member_id,
            member_name: row.text(columns::NAME),
            amount,
            kind,
            status,
            receipt_ref,
            confirmed_by: row.optional_text(columns::CONFIRMED_BY),
            confirmed_at: cell::datetime(row.cell(columns::CONFIRMED_AT)),
            sessions_at_submission: cell::integer(row.cell(columns::SESSIONS))
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
        })
    }

    /// Ordering key for "most recently submitted". Rows are appended in
    /// submission order, so the row breaks timestamp ties and covers rows whose
    /// timestamp cell no longer parses.
    pub fn recency_key(&self) -> (Option<NaiveDateTime>, u32) {
        (self.submitted_at, self.row)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewClaim {
    pub submitted_at: NaiveDateTime,
    pub member_id: i64,
    pub member_name: String,
    pub amount: Amount,
    pub kind: ClaimKind,
    pub receipt_ref: Option<String>,
    pub sessions_at_submission: u32,
}

impl NewClaim {
    /// New claims are always persisted as `pending`.
    pub fn to_row(&self) -> Vec<Value> {
        vec![
            Value::from(cell::format_datetime(self.submitted_at)),
            Value::from(self.member_name.clone()),
            Value::from(self.member_id),
            self.amount.to_cell(),
            Value::from(self.kind.as_str()),
            Value::from(ClaimStatus::Pending.as_str()),
            Value::from(self.receipt_ref.clone().unwrap_or_default()),
            Value::from(""),
            Value::from(""),
            Value::from(""),
            Value::from(self.sessions_at_submission),
            Value::from(""),
        ]
    }
}
