// Ledger gateway - typed access to the external table store

pub mod auth;
pub mod memory;
pub mod sheets;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::sync::Arc;

use crate::models::{
    attendance::{self, AttendanceEvent},
    cell::{self, RowError, SheetRow},
    claim::{self, Decision, NewClaim, PaymentClaim},
    member::{self, Member, MemberStatus, NewMember},
    settings::{self, PaymentBounds, SettingKey, SettingValue},
    Amount,
};

pub const MEMBERS_SHEET: &str = "Members";
pub const PAYMENTS_SHEET: &str = "Payments";
pub const ATTENDANCE_SHEET: &str = "Attendance";
pub const SETTINGS_SHEET: &str = "Settings";

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ledger API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Ledger authentication failed: {0}")]
    Auth(#[from] auth::AuthError),

    #[error("Invalid ledger URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Row {row} not found in {sheet}")]
    RowNotFound { sheet: String, row: u32 },

    #[error("Write rejected by store: {0}")]
    WriteRejected(String),

    #[error("Malformed row: {0}")]
    Malformed(#[from] RowError),
}

/// Raw primitives offered by the table store: whole-sheet reads, row appends
/// and single-cell updates. No queries, no transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Creates the sheet with a header row when it does not exist yet.
    async fn ensure_sheet(&self, sheet: &str, headers: &[&str]) -> Result<(), LedgerError>;

    /// Returns every data row (header excluded) with its sheet row number.
    async fn get_rows(&self, sheet: &str) -> Result<Vec<SheetRow>, LedgerError>;

    async fn append_row(&self, sheet: &str, cells: Vec<Value>) -> Result<(), LedgerError>;

    /// `row` and `column` are 1-based sheet coordinates.
    async fn update_cell(
        &self,
        sheet: &str,
        row: u32,
        column: usize,
        value: Value,
    ) -> Result<(), LedgerError>;
}

/// Typed gateway over a [`LedgerStore`]. It is the only component that writes
/// members, claims, attendance and settings.
///
/// Every operation is attempted exactly once. Failures are logged here and
/// returned; callers treat any `Err` as "not applied".
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

fn logged<T>(operation: &'static str, result: Result<T, LedgerError>) -> Result<T, LedgerError> {
    result.map_err(|e| {
        tracing::error!(operation, error = %e, "Ledger operation failed");
        e
    })
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Creates missing sheets and seeds default settings into a fresh
    /// settings sheet.
    pub async fn initialize(&self) -> Result<(), LedgerError> {
        self.store.ensure_sheet(MEMBERS_SHEET, &member::HEADERS).await?;
        self.store.ensure_sheet(PAYMENTS_SHEET, &claim::HEADERS).await?;
        self.store
            .ensure_sheet(ATTENDANCE_SHEET, &attendance::HEADERS)
            .await?;
        self.store
            .ensure_sheet(SETTINGS_SHEET, &settings::HEADERS)
            .await?;

        let existing = self.store.get_rows(SETTINGS_SHEET).await?;
        if existing.is_empty() {
            for key in SettingKey::ALL {
                self.store
                    .append_row(
                        SETTINGS_SHEET,
                        vec![
                            Value::from(key.as_str()),
                            key.default_value().to_cell(),
                            Value::from(""),
                        ],
                    )
                    .await?;
            }
            tracing::info!("Seeded default settings");
        }

        Ok(())
    }

    /// Cheap reachability probe used by the health endpoint.
    pub async fn ping(&self) -> Result<(), LedgerError> {
        self.store.get_rows(SETTINGS_SHEET).await.map(|_| ())
    }

    // Members

    pub async fn list_members(&self) -> Result<Vec<Member>, LedgerError> {
        let rows = logged("list_members", self.store.get_rows(MEMBERS_SHEET).await)?;
        Ok(parse_rows(MEMBERS_SHEET, &rows, Member::from_row))
    }

    pub async fn get_member(&self, id: i64) -> Result<Option<Member>, LedgerError> {
        Ok(self
            .list_members()
            .await?
            .into_iter()
            .find(|m| m.id == id))
    }

    pub async fn add_member(&self, member: &NewMember) -> Result<(), LedgerError> {
        let today = chrono::Local::now().date_naive();
        logged(
            "add_member",
            self.store
                .append_row(MEMBERS_SHEET, member.to_row(today))
                .await,
        )?;
        tracing::info!(member_id = member.id, "Member registered");
        Ok(())
    }

    /// Sets the status of an existing member. Returns `false` when no member
    /// row carries this id.
    pub async fn upsert_member_status(
        &self,
        id: i64,
        status: MemberStatus,
    ) -> Result<bool, LedgerError> {
        let Some(member) = self.get_member(id).await? else {
            tracing::warn!(member_id = id, "Member not found for status update");
            return Ok(false);
        };

        logged(
            "upsert_member_status",
            self.store
                .update_cell(
                    MEMBERS_SHEET,
                    member.row,
                    member::columns::STATUS,
                    Value::from(status.as_str()),
                )
                .await,
        )?;

        tracing::info!(member_id = id, status = %status, "Member status updated");
        Ok(true)
    }

    /// Records a confirmed payment on the member's account and reactivates
    /// them. Returns `false` when the member row is gone.
    pub async fn record_member_payment(
        &self,
        id: i64,
        paid_on: NaiveDate,
        amount: Amount,
    ) -> Result<bool, LedgerError> {
        let Some(member) = self.get_member(id).await? else {
            tracing::warn!(member_id = id, "Member not found for payment update");
            return Ok(false);
        };

        let updates = [
            (
                member::columns::LAST_PAYMENT_DATE,
                Value::from(cell::format_date(paid_on)),
            ),
            (member::columns::LAST_PAYMENT_AMOUNT, amount.to_cell()),
            (
                member::columns::STATUS,
                Value::from(MemberStatus::Active.as_str()),
            ),
        ];
        for (column, value) in updates {
            logged(
                "record_member_payment",
                self.store
                    .update_cell(MEMBERS_SHEET, member.row, column, value)
                    .await,
            )?;
        }

        Ok(true)
    }

    // Payment claims

    pub async fn append_claim(&self, claim: &NewClaim) -> Result<(), LedgerError> {
        logged(
            "append_claim",
            self.store.append_row(PAYMENTS_SHEET, claim.to_row()).await,
        )
    }

    /// Full scan of the payments sheet. Rows that fail to parse are skipped
    /// and logged rather than passed on untyped.
    pub async fn list_claims(&self) -> Result<Vec<PaymentClaim>, LedgerError> {
        let rows = logged("list_claims", self.store.get_rows(PAYMENTS_SHEET).await)?;
        Ok(parse_rows(PAYMENTS_SHEET, &rows, PaymentClaim::from_row))
    }

    /// Writes the terminal status of the claim at `row`.
    ///
    /// The status cell is written last: if an earlier write fails the claim
    /// still reads as `pending` and the action can be retried.
    pub async fn update_claim_terminal(
        &self,
        row: u32,
        decision: Decision,
        approver: &str,
        decided_at: NaiveDateTime,
    ) -> Result<(), LedgerError> {
        let updates = [
            (claim::columns::CONFIRMED_BY, Value::from(approver)),
            (
                claim::columns::CONFIRMED_AT,
                Value::from(cell::format_datetime(decided_at)),
            ),
            (
                claim::columns::STATUS,
                Value::from(decision.status().as_str()),
            ),
        ];
        for (column, value) in updates {
            logged(
                "update_claim_terminal",
                self.store
                    .update_cell(PAYMENTS_SHEET, row, column, value)
                    .await,
            )?;
        }

        tracing::info!(row, status = %decision.status(), approver, "Claim reached terminal state");
        Ok(())
    }

    // Attendance

    pub async fn append_attendance(&self, event: &AttendanceEvent) -> Result<(), LedgerError> {
        logged(
            "append_attendance",
            self.store.append_row(ATTENDANCE_SHEET, event.to_row()).await,
        )
    }

    pub async fn list_attendance(&self) -> Result<Vec<AttendanceEvent>, LedgerError> {
        let rows = logged(
            "list_attendance",
            self.store.get_rows(ATTENDANCE_SHEET).await,
        )?;
        Ok(parse_rows(ATTENDANCE_SHEET, &rows, AttendanceEvent::from_row))
    }

    /// Sessions consumed since the member's last payment, derived from
    /// attendance events.
    pub async fn sessions_since_last_payment(&self, member: &Member) -> Result<u32, LedgerError> {
        let events = self.list_attendance().await?;
        Ok(attendance::sessions_since(
            &events,
            member.id,
            member.last_payment_date,
        ))
    }

    // Settings

    /// Read-through lookup: a missing, unreadable or ill-typed value yields
    /// the hardcoded default.
    pub async fn get_setting(&self, key: SettingKey) -> SettingValue {
        let rows = match self.store.get_rows(SETTINGS_SHEET).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Settings unavailable, using default");
                return key.default_value();
            }
        };

        rows.iter()
            .find(|row| row.text(settings::columns::KEY) == key.as_str())
            .and_then(|row| {
                let stored = key.value_from_cell(row.cell(settings::columns::VALUE));
                if stored.is_none() {
                    tracing::warn!(key = %key, row = row.index, "Stored setting has the wrong type");
                }
                stored
            })
            .unwrap_or_else(|| key.default_value())
    }

    pub async fn get_integer_setting(&self, key: SettingKey) -> i64 {
        self.get_setting(key)
            .await
            .as_integer()
            .or_else(|| key.default_value().as_integer())
            .unwrap_or_default()
    }

    pub async fn payment_bounds(&self) -> PaymentBounds {
        PaymentBounds {
            min: self.get_integer_setting(SettingKey::MinPayment).await,
            max: self.get_integer_setting(SettingKey::MaxPayment).await,
        }
    }

    /// Last write wins: updates the existing row for `key` or appends one.
    pub async fn set_setting(&self, key: SettingKey, value: &SettingValue) -> Result<(), LedgerError> {
        let rows = logged("set_setting", self.store.get_rows(SETTINGS_SHEET).await)?;

        let result = match rows
            .iter()
            .find(|row| row.text(settings::columns::KEY) == key.as_str())
        {
            Some(row) => {
                self.store
                    .update_cell(SETTINGS_SHEET, row.index, settings::columns::VALUE, value.to_cell())
                    .await
            }
            None => {
                self.store
                    .append_row(
                        SETTINGS_SHEET,
                        vec![Value::from(key.as_str()), value.to_cell(), Value::from("")],
                    )
                    .await
            }
        };
        logged("set_setting", result)?;

        tracing::info!(key = %key, "Setting updated");
        Ok(())
    }
}

fn parse_rows<T>(
    sheet: &str,
    rows: &[SheetRow],
    parse: impl Fn(&SheetRow) -> Result<T, RowError>,
) -> Vec<T> {
    rows.iter()
        .filter(|row| !row.cells.iter().all(cell::is_blank))
        .filter_map(|row| match parse(row) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(sheet, error = %e, "Skipping malformed ledger row");
                None
            }
        })
        .collect()
}
