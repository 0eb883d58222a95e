//! External ledger store integrations
//!
//! The spreadsheet is the only durable shared state. Everything above this
//! module talks to it through [`LedgerStore`], which only knows about sheets,
//! rows and cells.

pub mod memory;
pub mod sheets;

pub use memory::MemoryLedger;
pub use sheets::GoogleSheetsClient;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AppResult;

/// Address of one cell: sheet name, 1-based row, 0-based column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CellRef {
    pub sheet: String,
    pub row: u32,
    pub column: usize,
}

impl CellRef {
    pub fn new(sheet: impl Into<String>, row: u32, column: usize) -> Self {
        Self {
            sheet: sheet.into(),
            row,
            column,
        }
    }

    /// A1 notation, e.g. `'Stock Movements'!C12`
    pub fn to_a1(&self) -> String {
        format!(
            "{}!{}{}",
            quote_sheet_name(&self.sheet),
            column_letters(self.column),
            self.row
        )
    }
}

/// One cell write within a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    pub cell: CellRef,
    pub value: String,
}

impl CellUpdate {
    pub fn new(cell: CellRef, value: impl Into<String>) -> Self {
        Self {
            cell,
            value: value.into(),
        }
    }
}

/// Narrow contract over the tabular ledger store
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// All rows of a sheet, header row first. Trailing empty cells may be
    /// omitted by the store.
    async fn read_rows(&self, sheet: &str) -> AppResult<Vec<Vec<String>>>;

    async fn write_cell(&self, cell: &CellRef, value: &str) -> AppResult<()>;

    /// Write several cells in one request
    async fn batch_write(&self, updates: &[CellUpdate]) -> AppResult<()>;

    /// Append a row after the last non-empty row of a sheet
    async fn append_row(&self, sheet: &str, row: Vec<String>) -> AppResult<()>;

    /// Short name for health reporting
    fn backend_name(&self) -> &'static str;
}

/// Column index to letters: 0 -> A, 25 -> Z, 26 -> AA
pub fn column_letters(mut column: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (column % 26) as u8);
        if column < 26 {
            break;
        }
        column = column / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Quote a sheet name for A1 notation, doubling embedded quotes
pub fn quote_sheet_name(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn test_a1_quotes_sheet_names() {
        assert_eq!(CellRef::new("Leads", 2, 3).to_a1(), "'Leads'!D2");
        assert_eq!(CellRef::new("Bob's Stock", 10, 0).to_a1(), "'Bob''s Stock'!A10");
    }
}
