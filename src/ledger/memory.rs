use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{LedgerError, LedgerStore};
use crate::models::cell::SheetRow;

#[derive(Default)]
struct Tables {
    /// Sheet name -> rows, index 0 being the header row
    sheets: HashMap<String, Vec<Vec<Value>>>,
    read_only: HashSet<String>,
}

/// In-process table store with the same row semantics as the spreadsheet
/// backend. Used for local runs without Google credentials and by tests,
/// which can make individual sheets reject writes.
#[derive(Default)]
pub struct MemoryLedger {
    tables: Mutex<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock cannot leave a half-written row.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes every subsequent append or update on `sheet` fail.
    pub fn reject_writes_to(&self, sheet: &str) {
        self.tables().read_only.insert(sheet.to_string());
    }

    pub fn accept_writes_to(&self, sheet: &str) {
        self.tables().read_only.remove(sheet);
    }

    /// Removes `sheet` entirely, as if its tab had been deleted.
    pub fn drop_sheet(&self, sheet: &str) {
        self.tables().sheets.remove(sheet);
    }

    /// Copy of every row of `sheet`, header included.
    pub fn snapshot(&self, sheet: &str) -> Vec<Vec<Value>> {
        self.tables().sheets.get(sheet).cloned().unwrap_or_default()
    }
}

fn check_writable(tables: &Tables, sheet: &str) -> Result<(), LedgerError> {
    if tables.read_only.contains(sheet) {
        return Err(LedgerError::WriteRejected(format!("{} is read-only", sheet)));
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn ensure_sheet(&self, sheet: &str, headers: &[&str]) -> Result<(), LedgerError> {
        let mut tables = self.tables();
        if !tables.sheets.contains_key(sheet) {
            let header_row = headers.iter().map(|h| Value::from(*h)).collect();
            tables.sheets.insert(sheet.to_string(), vec![header_row]);
            tracing::debug!(sheet, "Created in-memory sheet");
        }
        Ok(())
    }

    async fn get_rows(&self, sheet: &str) -> Result<Vec<SheetRow>, LedgerError> {
        let tables = self.tables();
        let rows = tables
            .sheets
            .get(sheet)
            .ok_or_else(|| LedgerError::SheetNotFound(sheet.to_string()))?;

        Ok(rows
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, cells)| SheetRow::new(i as u32 + 1, cells.clone()))
            .collect())
    }

    async fn append_row(&self, sheet: &str, cells: Vec<Value>) -> Result<(), LedgerError> {
        let mut tables = self.tables();
        check_writable(&tables, sheet)?;
        tables
            .sheets
            .get_mut(sheet)
            .ok_or_else(|| LedgerError::SheetNotFound(sheet.to_string()))?
            .push(cells);
        Ok(())
    }

    async fn update_cell(
        &self,
        sheet: &str,
        row: u32,
        column: usize,
        value: Value,
    ) -> Result<(), LedgerError> {
        let mut tables = self.tables();
        check_writable(&tables, sheet)?;
        let rows = tables
            .sheets
            .get_mut(sheet)
            .ok_or_else(|| LedgerError::SheetNotFound(sheet.to_string()))?;

        let cells = (row as usize)
            .checked_sub(1)
            .and_then(|i| rows.get_mut(i))
            .filter(|_| row > 1 && column > 0)
            .ok_or_else(|| LedgerError::RowNotFound {
                sheet: sheet.to_string(),
                row,
            })?;

        if cells.len() < column {
            cells.resize(column, Value::from(""));
        }
        cells[column - 1] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_rows_are_numbered_like_a_sheet() {
        let store = MemoryLedger::new();
        store.ensure_sheet("S", &["a", "b"]).await.unwrap();
        store.append_row("S", vec![json!(1)]).await.unwrap();
        store.append_row("S", vec![json!(2)]).await.unwrap();

        let rows = store.get_rows("S").await.unwrap();
        assert_eq!(rows.iter().map(|r| r.index).collect::<Vec<_>>(), vec![2, 3]);

        store.update_cell("S", 3, 4, json!("x")).await.unwrap();
        assert_eq!(store.snapshot("S")[2], vec![json!(2), json!(""), json!(""), json!("x")]);
    }

    #[tokio::test]
    async fn test_header_row_and_missing_rows_are_not_writable() {
        let store = MemoryLedger::new();
        store.ensure_sheet("S", &["a"]).await.unwrap();

        assert!(matches!(
            store.update_cell("S", 1, 1, json!("x")).await,
            Err(LedgerError::RowNotFound { row: 1, .. })
        ));
        assert!(matches!(
            store.update_cell("S", 7, 1, json!("x")).await,
            Err(LedgerError::RowNotFound { row: 7, .. })
        ));
        assert!(matches!(
            store.get_rows("Missing").await,
            Err(LedgerError::SheetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_writes() {
        let store = MemoryLedger::new();
        store.ensure_sheet("S", &["a"]).await.unwrap();
        store.reject_writes_to("S");

        assert!(matches!(
            store.append_row("S", vec![json!(1)]).await,
            Err(LedgerError::WriteRejected(_))
        ));
        assert!(store.get_rows("S").await.unwrap().is_empty());

        store.accept_writes_to("S");
        store.append_row("S", vec![json!(1)]).await.unwrap();
    }
}
