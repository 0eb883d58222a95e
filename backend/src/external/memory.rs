//! In-process ledger store
//!
//! Used for local development without spreadsheet credentials and by the
//! test suite. Write failures can be injected per sheet to exercise the
//! compensation paths.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::{CellRef, CellUpdate, LedgerStore};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct Inner {
    sheets: HashMap<String, Vec<Vec<String>>>,
    /// sheet -> number of writes still allowed before failing
    failing: HashMap<String, usize>,
    failing_reads: Vec<String>,
}

/// Ledger store held in memory
#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<Inner>,
    writes: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a sheet with rows (header row first)
    pub fn with_sheet(mut self, sheet: &str, rows: Vec<Vec<&str>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(str::to_string).collect())
            .collect();
        self.inner.get_mut().sheets.insert(sheet.to_string(), rows);
        self
    }

    /// Snapshot of a sheet's rows
    pub async fn rows(&self, sheet: &str) -> Vec<Vec<String>> {
        self.inner
            .lock()
            .await
            .sheets
            .get(sheet)
            .cloned()
            .unwrap_or_default()
    }

    /// Value of one cell, empty when out of range
    pub async fn cell(&self, sheet: &str, row: u32, column: usize) -> String {
        let inner = self.inner.lock().await;
        inner
            .sheets
            .get(sheet)
            .and_then(|rows| rows.get(row.saturating_sub(1) as usize))
            .and_then(|r| r.get(column))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of write requests that reached the store (successful or not)
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following write touching `sheet` fail
    pub async fn fail_writes_to(&self, sheet: &str) {
        self.fail_writes_to_after(sheet, 0).await;
    }

    /// Allow `allowed` more writes to `sheet`, then fail the rest
    pub async fn fail_writes_to_after(&self, sheet: &str, allowed: usize) {
        self.inner
            .lock()
            .await
            .failing
            .insert(sheet.to_string(), allowed);
    }

    pub async fn fail_reads_from(&self, sheet: &str) {
        self.inner.lock().await.failing_reads.push(sheet.to_string());
    }

    pub async fn clear_failures(&self) {
        let mut inner = self.inner.lock().await;
        inner.failing.clear();
        inner.failing_reads.clear();
    }
}

impl Inner {
    fn check_write(&mut self, sheet: &str) -> AppResult<()> {
        match self.failing.get_mut(sheet) {
            Some(0) => Err(AppError::Ledger(format!(
                "injected write failure for sheet {}",
                sheet
            ))),
            Some(allowed) => {
                *allowed -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn set(&mut self, cell: &CellRef, value: &str) {
        let rows = self.sheets.entry(cell.sheet.clone()).or_default();
        let row_index = cell.row.saturating_sub(1) as usize;
        if rows.len() <= row_index {
            rows.resize_with(row_index + 1, Vec::new);
        }
        let row = &mut rows[row_index];
        if row.len() <= cell.column {
            row.resize(cell.column + 1, String::new());
        }
        row[cell.column] = value.to_string();
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn read_rows(&self, sheet: &str) -> AppResult<Vec<Vec<String>>> {
        let inner = self.inner.lock().await;
        if inner.failing_reads.iter().any(|s| s == sheet) {
            return Err(AppError::Ledger(format!(
                "injected read failure for sheet {}",
                sheet
            )));
        }
        Ok(inner.sheets.get(sheet).cloned().unwrap_or_default())
    }

    async fn write_cell(&self, cell: &CellRef, value: &str) -> AppResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;
        inner.check_write(&cell.sheet)?;
        inner.set(cell, value);
        Ok(())
    }

    async fn batch_write(&self, updates: &[CellUpdate]) -> AppResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;

        // All-or-nothing: check every sheet before touching any cell
        let mut sheets: Vec<&str> = updates.iter().map(|u| u.cell.sheet.as_str()).collect();
        sheets.sort_unstable();
        sheets.dedup();
        for sheet in sheets {
            inner.check_write(sheet)?;
        }

        for update in updates {
            inner.set(&update.cell, &update.value);
        }
        Ok(())
    }

    async fn append_row(&self, sheet: &str, row: Vec<String>) -> AppResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;
        inner.check_write(sheet)?;

        let rows = inner.sheets.entry(sheet.to_string()).or_default();
        while rows
            .last()
            .map(|r| r.iter().all(|c| c.trim().is_empty()))
            .unwrap_or(false)
        {
            rows.pop();
        }
        rows.push(row);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_extends_sheet() {
        let ledger = MemoryLedger::new().with_sheet("Leads", vec![vec!["Name"]]);
        ledger
            .write_cell(&CellRef::new("Leads", 3, 2), "x")
            .await
            .unwrap();

        let rows = ledger.rows("Leads").await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec!["", "", "x"]);
    }

    #[tokio::test]
    async fn test_batch_write_is_all_or_nothing() {
        let ledger = MemoryLedger::new();
        ledger.fail_writes_to("Stock").await;

        let result = ledger
            .batch_write(&[
                CellUpdate::new(CellRef::new("Leads", 2, 0), "a"),
                CellUpdate::new(CellRef::new("Stock", 2, 0), "b"),
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(ledger.cell("Leads", 2, 0).await, "");
        assert_eq!(ledger.write_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_after_allowance() {
        let ledger = MemoryLedger::new();
        ledger.fail_writes_to_after("Stock", 1).await;

        let cell = CellRef::new("Stock", 2, 0);
        assert!(ledger.write_cell(&cell, "1").await.is_ok());
        assert!(ledger.write_cell(&cell, "2").await.is_err());
        assert_eq!(ledger.cell("Stock", 2, 0).await, "1");
    }

    #[tokio::test]
    async fn test_append_skips_trailing_blank_rows() {
        let ledger = MemoryLedger::new().with_sheet("M", vec![vec!["Id"], vec!["1"], vec![""]]);
        ledger.append_row("M", vec!["2".into()]).await.unwrap();
        let rows = ledger.rows("M").await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec!["2"]);
    }
}
