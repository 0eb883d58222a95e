//! Ledger accessor: typed records over the spreadsheet store
//!
//! Columns are located by header text, never by position. Each canonical
//! field accepts several header spellings; the header row is resolved once
//! per read into a [`HeaderIndex`] that the returned table carries so later
//! writes address the same columns the read saw.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::SheetsConfig;
use crate::error::{AppError, AppResult};
use crate::external::{CellRef, CellUpdate, LedgerStore};
use shared::{
    normalize_digits, split_synonyms, Lead, LeadStatus, MovementType, RowNumber, StockItem,
    StockMovement,
};

const CURSOR_KEY: &str = "round_robin_cursor";

/// A canonical column with its accepted header spellings
pub trait Field: Copy + Eq + Hash + 'static {
    fn name(self) -> &'static str;

    /// Accepted headers, highest priority first
    fn headers(self) -> &'static [&'static str];
}

/// Lead ledger columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeadField {
    OrderDate,
    CustomerName,
    Phone,
    Whatsapp,
    Governorate,
    Area,
    Address,
    Product,
    Quantity,
    TotalPrice,
    Status,
    Notes,
    Source,
    Assignee,
}

impl LeadField {
    pub const ALL: [LeadField; 14] = [
        LeadField::OrderDate,
        LeadField::CustomerName,
        LeadField::Phone,
        LeadField::Whatsapp,
        LeadField::Governorate,
        LeadField::Area,
        LeadField::Address,
        LeadField::Product,
        LeadField::Quantity,
        LeadField::TotalPrice,
        LeadField::Status,
        LeadField::Notes,
        LeadField::Source,
        LeadField::Assignee,
    ];

    const REQUIRED: [LeadField; 4] = [
        LeadField::Product,
        LeadField::Quantity,
        LeadField::Status,
        LeadField::Assignee,
    ];
}

impl Field for LeadField {
    fn name(self) -> &'static str {
        match self {
            LeadField::OrderDate => "order_date",
            LeadField::CustomerName => "customer_name",
            LeadField::Phone => "phone",
            LeadField::Whatsapp => "whatsapp",
            LeadField::Governorate => "governorate",
            LeadField::Area => "area",
            LeadField::Address => "address",
            LeadField::Product => "product",
            LeadField::Quantity => "quantity",
            LeadField::TotalPrice => "total_price",
            LeadField::Status => "status",
            LeadField::Notes => "notes",
            LeadField::Source => "source",
            LeadField::Assignee => "assignee",
        }
    }

    fn headers(self) -> &'static [&'static str] {
        match self {
            LeadField::OrderDate => &["order date", "date", "created at", "timestamp"],
            LeadField::CustomerName => &["customer name", "name", "full name", "customer"],
            LeadField::Phone => &["phone", "phone number", "mobile", "mobile number"],
            LeadField::Whatsapp => &["whatsapp", "whatsapp number", "whats app"],
            LeadField::Governorate => &["governorate", "city", "state", "province"],
            LeadField::Area => &["area", "district", "region"],
            LeadField::Address => &["address", "full address", "shipping address"],
            LeadField::Product => &["product", "product name", "item"],
            LeadField::Quantity => &["quantity", "qty", "count"],
            LeadField::TotalPrice => &["total price", "total", "price", "amount"],
            LeadField::Status => &["status", "order status"],
            LeadField::Notes => &["notes", "note", "comments"],
            LeadField::Source => &["source", "lead source", "channel"],
            LeadField::Assignee => &["assignee", "assigned to", "employee", "agent"],
        }
    }
}

/// Stock ledger columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StockField {
    ProductName,
    InitialQuantity,
    CurrentQuantity,
    LastUpdate,
    Synonyms,
    MinThreshold,
}

impl StockField {
    pub const ALL: [StockField; 6] = [
        StockField::ProductName,
        StockField::InitialQuantity,
        StockField::CurrentQuantity,
        StockField::LastUpdate,
        StockField::Synonyms,
        StockField::MinThreshold,
    ];

    const REQUIRED: [StockField; 2] = [StockField::ProductName, StockField::CurrentQuantity];
}

impl Field for StockField {
    fn name(self) -> &'static str {
        match self {
            StockField::ProductName => "product_name",
            StockField::InitialQuantity => "initial_quantity",
            StockField::CurrentQuantity => "current_quantity",
            StockField::LastUpdate => "last_update",
            StockField::Synonyms => "synonyms",
            StockField::MinThreshold => "min_threshold",
        }
    }

    fn headers(self) -> &'static [&'static str] {
        match self {
            StockField::ProductName => &["product name", "product", "name"],
            StockField::InitialQuantity => &["initial quantity", "initial stock", "opening quantity"],
            StockField::CurrentQuantity => &["current quantity", "current stock", "quantity", "available"],
            StockField::LastUpdate => &["last update", "last updated", "updated at"],
            StockField::Synonyms => &["synonyms", "aliases", "alternate names"],
            StockField::MinThreshold => &["min threshold", "minimum", "alert threshold", "reorder level"],
        }
    }
}

/// Movement log columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementField {
    Id,
    Timestamp,
    ProductName,
    MovementType,
    Quantity,
    OrderId,
    Reason,
    Notes,
}

impl MovementField {
    pub const ALL: [MovementField; 8] = [
        MovementField::Id,
        MovementField::Timestamp,
        MovementField::ProductName,
        MovementField::MovementType,
        MovementField::Quantity,
        MovementField::OrderId,
        MovementField::Reason,
        MovementField::Notes,
    ];

    /// Header written when the movement sheet is empty
    fn default_header(self) -> &'static str {
        match self {
            MovementField::Id => "Id",
            MovementField::Timestamp => "Date",
            MovementField::ProductName => "Product Name",
            MovementField::MovementType => "Type",
            MovementField::Quantity => "Quantity",
            MovementField::OrderId => "Order Id",
            MovementField::Reason => "Reason",
            MovementField::Notes => "Notes",
        }
    }
}

impl Field for MovementField {
    fn name(self) -> &'static str {
        match self {
            MovementField::Id => "id",
            MovementField::Timestamp => "timestamp",
            MovementField::ProductName => "product_name",
            MovementField::MovementType => "movement_type",
            MovementField::Quantity => "quantity",
            MovementField::OrderId => "order_id",
            MovementField::Reason => "reason",
            MovementField::Notes => "notes",
        }
    }

    fn headers(self) -> &'static [&'static str] {
        match self {
            MovementField::Id => &["id", "movement id"],
            MovementField::Timestamp => &["date", "timestamp", "time"],
            MovementField::ProductName => &["product name", "product"],
            MovementField::MovementType => &["type", "movement type"],
            MovementField::Quantity => &["quantity", "qty", "delta"],
            MovementField::OrderId => &["order id", "order", "row number"],
            MovementField::Reason => &["reason"],
            MovementField::Notes => &["notes", "note"],
        }
    }
}

/// Normalize header text: lowercase alphanumerics only
fn header_key(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolved column positions for one sheet
#[derive(Debug, Clone)]
pub struct HeaderIndex<F: Field> {
    sheet: String,
    columns: HashMap<F, usize>,
}

impl<F: Field> HeaderIndex<F> {
    /// Resolve a header row. For each field the first accepted spelling that
    /// appears in the row wins.
    pub fn resolve(sheet: &str, header_row: &[String], fields: &[F]) -> Self {
        let keys: Vec<String> = header_row.iter().map(|h| header_key(h)).collect();
        let mut columns = HashMap::new();

        for &field in fields {
            let position = field.headers().iter().find_map(|candidate| {
                let candidate = header_key(candidate);
                keys.iter().position(|k| *k == candidate)
            });
            if let Some(column) = position {
                columns.insert(field, column);
            }
        }

        Self {
            sheet: sheet.to_string(),
            columns,
        }
    }

    pub fn column(&self, field: F) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    /// Fail with a configuration error naming any missing required field
    pub fn require(&self, fields: &[F]) -> AppResult<()> {
        let missing: Vec<&str> = fields
            .iter()
            .filter(|f| !self.columns.contains_key(f))
            .map(|f| f.name())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::Configuration(format!(
                "sheet '{}' is missing required columns: {}",
                self.sheet,
                missing.join(", ")
            )))
        }
    }

    /// Cell address of a field in a row
    pub fn cell(&self, row: RowNumber, field: F) -> AppResult<CellRef> {
        let column = self.column(field).ok_or_else(|| {
            AppError::Configuration(format!(
                "sheet '{}' has no column for {}",
                self.sheet,
                field.name()
            ))
        })?;
        Ok(CellRef::new(self.sheet.clone(), row, column))
    }

    /// Trimmed text of a field in a raw row, empty when absent
    pub fn text<'a>(&self, row: &'a [String], field: F) -> &'a str {
        self.column(field)
            .and_then(|c| row.get(c))
            .map(|s| s.trim())
            .unwrap_or("")
    }

    /// Lay out values in column order for appending a row
    pub fn layout(&self, values: &[(F, String)]) -> Vec<String> {
        let width = self.columns.values().max().map(|m| m + 1).unwrap_or(0);
        let mut row = vec![String::new(); width];
        for (field, value) in values {
            if let Some(column) = self.column(*field) {
                row[column] = value.clone();
            }
        }
        row
    }
}

/// Leads as read, plus the columns they were read through
#[derive(Debug, Clone)]
pub struct LeadTable {
    pub columns: HeaderIndex<LeadField>,
    pub leads: Vec<Lead>,
}

impl LeadTable {
    pub fn get(&self, row: RowNumber) -> Option<&Lead> {
        self.leads.iter().find(|l| l.row_number == row)
    }

    pub fn update(&self, row: RowNumber, field: LeadField, value: impl Into<String>) -> AppResult<CellUpdate> {
        Ok(CellUpdate::new(self.columns.cell(row, field)?, value))
    }
}

/// Stock items as read, plus their columns
#[derive(Debug, Clone)]
pub struct StockTable {
    pub columns: HeaderIndex<StockField>,
    pub items: Vec<StockItem>,
}

/// Typed access to the lead, stock, movement and settings sheets
#[derive(Clone)]
pub struct SheetLedger {
    store: Arc<dyn LedgerStore>,
    leads_sheet: String,
    stock_sheet: String,
    movements_sheet: String,
    settings_sheet: String,
    /// Movement columns, resolved on the first append. The log is
    /// append-only, so its header does not move while the service runs.
    movement_columns: Arc<RwLock<Option<HeaderIndex<MovementField>>>>,
}

impl SheetLedger {
    pub fn new(store: Arc<dyn LedgerStore>, config: &SheetsConfig) -> Self {
        Self {
            store,
            leads_sheet: config.leads_sheet.clone(),
            stock_sheet: config.stock_sheet.clone(),
            movements_sheet: config.movements_sheet.clone(),
            settings_sheet: config.settings_sheet.clone(),
            movement_columns: Arc::new(RwLock::new(None)),
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Read every lead row
    pub async fn read_leads(&self) -> AppResult<LeadTable> {
        let rows = self.store.read_rows(&self.leads_sheet).await?;
        let header = rows.first().cloned().unwrap_or_default();
        let columns = HeaderIndex::resolve(&self.leads_sheet, &header, &LeadField::ALL);
        columns.require(&LeadField::REQUIRED)?;

        let leads = rows
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, row)| !is_blank(row))
            .map(|(i, row)| parse_lead(&columns, (i + 1) as RowNumber, row))
            .collect();

        Ok(LeadTable { columns, leads })
    }

    /// Read every stock item
    pub async fn read_stock(&self) -> AppResult<StockTable> {
        let rows = self.store.read_rows(&self.stock_sheet).await?;
        let header = rows.first().cloned().unwrap_or_default();
        let columns = HeaderIndex::resolve(&self.stock_sheet, &header, &StockField::ALL);
        columns.require(&StockField::REQUIRED)?;

        let items = rows
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, row)| parse_stock_item(&columns, (i + 1) as RowNumber, row))
            .collect();

        Ok(StockTable { columns, items })
    }

    /// Read the movement log, oldest first
    pub async fn read_movements(&self) -> AppResult<Vec<StockMovement>> {
        let rows = self.store.read_rows(&self.movements_sheet).await?;
        let Some(header) = rows.first() else {
            return Ok(Vec::new());
        };
        let columns = HeaderIndex::resolve(&self.movements_sheet, header, &MovementField::ALL);

        Ok(rows
            .iter()
            .skip(1)
            .filter(|row| !is_blank(row))
            .filter_map(|row| parse_movement(&columns, row))
            .collect())
    }

    /// Write a set of cells in one request
    pub async fn write(&self, updates: &[CellUpdate]) -> AppResult<()> {
        self.store.batch_write(updates).await
    }

    /// Write one lead's status
    pub async fn write_status(
        &self,
        table: &LeadTable,
        row: RowNumber,
        status: LeadStatus,
    ) -> AppResult<()> {
        let cell = table.columns.cell(row, LeadField::Status)?;
        self.store.write_cell(&cell, status.as_str()).await
    }

    /// Write a stock item's quantity and last-update stamp together
    pub async fn write_stock_quantity(
        &self,
        table: &StockTable,
        item: &StockItem,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut updates = vec![CellUpdate::new(
            table.columns.cell(item.row_number, StockField::CurrentQuantity)?,
            quantity.to_string(),
        )];
        if let Ok(cell) = table.columns.cell(item.row_number, StockField::LastUpdate) {
            updates.push(CellUpdate::new(cell, format_timestamp(at)));
        }
        self.store.batch_write(&updates).await
    }

    /// Append a new stock item row
    pub async fn append_stock_item(&self, table: &StockTable, item: &StockItem) -> AppResult<()> {
        let row = table.columns.layout(&[
            (StockField::ProductName, item.product_name.clone()),
            (StockField::InitialQuantity, item.initial_quantity.to_string()),
            (StockField::CurrentQuantity, item.current_quantity.to_string()),
            (
                StockField::LastUpdate,
                item.last_update.map(format_timestamp).unwrap_or_default(),
            ),
            (StockField::Synonyms, item.synonyms.join(", ")),
            (
                StockField::MinThreshold,
                item.min_threshold.map(|t| t.to_string()).unwrap_or_default(),
            ),
        ]);
        self.store.append_row(&self.stock_sheet, row).await
    }

    /// Rewrite a stock item's synonyms and threshold
    pub async fn update_stock_metadata(
        &self,
        table: &StockTable,
        item: &StockItem,
    ) -> AppResult<()> {
        let updates = vec![
            CellUpdate::new(
                table.columns.cell(item.row_number, StockField::Synonyms)?,
                item.synonyms.join(", "),
            ),
            CellUpdate::new(
                table.columns.cell(item.row_number, StockField::MinThreshold)?,
                item.min_threshold.map(|t| t.to_string()).unwrap_or_default(),
            ),
        ];
        self.store.batch_write(&updates).await
    }

    /// Append one movement, writing the header row first if the sheet is empty
    pub async fn append_movement(&self, movement: &StockMovement) -> AppResult<()> {
        let columns = self.movement_columns().await?;
        let row = columns.layout(&[
            (MovementField::Id, movement.id.to_string()),
            (MovementField::Timestamp, format_timestamp(movement.timestamp)),
            (MovementField::ProductName, movement.product_name.clone()),
            (MovementField::MovementType, movement.movement_type.to_string()),
            (MovementField::Quantity, movement.quantity.to_string()),
            (
                MovementField::OrderId,
                movement.order_id.map(|o| o.to_string()).unwrap_or_default(),
            ),
            (MovementField::Reason, movement.reason.clone()),
            (MovementField::Notes, movement.notes.clone()),
        ]);
        self.store.append_row(&self.movements_sheet, row).await
    }

    /// Cached movement columns; the sheet is only read on first use
    async fn movement_columns(&self) -> AppResult<HeaderIndex<MovementField>> {
        if let Some(columns) = self.movement_columns.read().await.as_ref() {
            return Ok(columns.clone());
        }

        let mut cached = self.movement_columns.write().await;
        if let Some(columns) = cached.as_ref() {
            return Ok(columns.clone());
        }

        let rows = self.store.read_rows(&self.movements_sheet).await?;
        let header = match rows.first() {
            Some(header) if !is_blank(header) => header.clone(),
            _ => {
                let header: Vec<String> = MovementField::ALL
                    .iter()
                    .map(|f| f.default_header().to_string())
                    .collect();
                self.store
                    .append_row(&self.movements_sheet, header.clone())
                    .await?;
                header
            }
        };

        let columns = HeaderIndex::resolve(&self.movements_sheet, &header, &MovementField::ALL);
        *cached = Some(columns.clone());
        Ok(columns)
    }

    /// Persisted round-robin cursor and the cell it lives in
    pub async fn read_cursor(&self) -> AppResult<CursorSlot> {
        let rows = self.store.read_rows(&self.settings_sheet).await?;
        let position = rows
            .iter()
            .position(|row| row.first().map(|k| k.trim() == CURSOR_KEY).unwrap_or(false));

        let Some(index) = position else {
            return Ok(CursorSlot::default());
        };

        let value = rows[index]
            .get(1)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|v| usize::try_from(v).ok());

        Ok(CursorSlot {
            value,
            cell: Some(CellRef::new(
                self.settings_sheet.clone(),
                (index + 1) as RowNumber,
                1,
            )),
        })
    }

    /// Cell holding the cursor, creating the settings row when missing so the
    /// cursor can be written in the same batch as the assignments
    pub async fn cursor_cell(&self, slot: &CursorSlot) -> AppResult<CellRef> {
        if let Some(cell) = &slot.cell {
            return Ok(cell.clone());
        }

        self.store
            .append_row(
                &self.settings_sheet,
                vec![CURSOR_KEY.to_string(), "-1".to_string()],
            )
            .await?;

        self.read_cursor().await?.cell.ok_or_else(|| {
            AppError::Ledger(format!(
                "cursor row missing from '{}' after append",
                self.settings_sheet
            ))
        })
    }
}

/// The round-robin cursor as persisted in the settings sheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorSlot {
    /// Last roster index used; `None` when never written or negative
    pub value: Option<usize>,
    pub cell: Option<CellRef>,
}

impl CursorSlot {
    pub fn encode(cursor: Option<usize>) -> String {
        cursor.map(|c| c.to_string()).unwrap_or_else(|| "-1".to_string())
    }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

fn parse_lead(columns: &HeaderIndex<LeadField>, row_number: RowNumber, row: &[String]) -> Lead {
    let text = |field| columns.text(row, field).to_string();

    let raw_status = columns.text(row, LeadField::Status);
    let status = raw_status.parse::<LeadStatus>().unwrap_or_else(|e| {
        tracing::warn!(row = row_number, error = %e, "Unreadable lead status, treating as new");
        LeadStatus::New
    });

    let assignee = columns.text(row, LeadField::Assignee);

    Lead {
        row_number,
        order_date: text(LeadField::OrderDate),
        customer_name: text(LeadField::CustomerName),
        phone: text(LeadField::Phone),
        whatsapp: text(LeadField::Whatsapp),
        governorate: text(LeadField::Governorate),
        area: text(LeadField::Area),
        address: text(LeadField::Address),
        product: text(LeadField::Product),
        quantity: text(LeadField::Quantity),
        total_price: text(LeadField::TotalPrice),
        status,
        notes: text(LeadField::Notes),
        source: text(LeadField::Source),
        assignee: (!assignee.is_empty()).then(|| assignee.to_string()),
    }
}

/// Integer cell, tolerant of thousands separators and Arabic-Indic digits
fn parse_count(text: &str) -> Option<i64> {
    let cleaned: String = normalize_digits(text)
        .chars()
        .filter(|c| !matches!(c, ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned
        .parse::<i64>()
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().map(|f| f.trunc() as i64))
}

fn parse_stock_item(
    columns: &HeaderIndex<StockField>,
    row_number: RowNumber,
    row: &[String],
) -> Option<StockItem> {
    let product_name = columns.text(row, StockField::ProductName);
    if product_name.is_empty() {
        return None;
    }

    let raw_current = columns.text(row, StockField::CurrentQuantity);
    let current_quantity = match parse_count(raw_current) {
        Some(q) if q >= 0 => q,
        Some(q) => {
            tracing::warn!(row = row_number, product = product_name, quantity = q, "Negative stock in ledger, reading as zero");
            0
        }
        None => {
            tracing::warn!(row = row_number, product = product_name, value = raw_current, "Unreadable stock quantity, reading as zero");
            0
        }
    };

    Some(StockItem {
        row_number,
        product_name: product_name.to_string(),
        initial_quantity: parse_count(columns.text(row, StockField::InitialQuantity))
            .unwrap_or(current_quantity),
        current_quantity,
        last_update: parse_timestamp(columns.text(row, StockField::LastUpdate)),
        synonyms: split_synonyms(columns.text(row, StockField::Synonyms)),
        min_threshold: parse_count(columns.text(row, StockField::MinThreshold)),
    })
}

fn parse_movement(columns: &HeaderIndex<MovementField>, row: &[String]) -> Option<StockMovement> {
    let movement_type = columns
        .text(row, MovementField::MovementType)
        .parse::<MovementType>()
        .ok()?;

    Some(StockMovement {
        id: Uuid::parse_str(columns.text(row, MovementField::Id)).unwrap_or_else(|_| Uuid::nil()),
        timestamp: parse_timestamp(columns.text(row, MovementField::Timestamp)).unwrap_or_default(),
        product_name: columns.text(row, MovementField::ProductName).to_string(),
        movement_type,
        quantity: parse_count(columns.text(row, MovementField::Quantity)).unwrap_or(0),
        order_id: columns.text(row, MovementField::OrderId).parse().ok(),
        reason: columns.text(row, MovementField::Reason).to_string(),
        notes: columns.text(row, MovementField::Notes).to_string(),
    })
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_header_synonyms_resolve() {
        let row = header(&["Date", "Full Name", "Product Name", "Qty", "Order Status", "Assigned To"]);
        let index = HeaderIndex::resolve("Leads", &row, &LeadField::ALL);

        assert_eq!(index.column(LeadField::OrderDate), Some(0));
        assert_eq!(index.column(LeadField::CustomerName), Some(1));
        assert_eq!(index.column(LeadField::Product), Some(2));
        assert_eq!(index.column(LeadField::Quantity), Some(3));
        assert_eq!(index.column(LeadField::Status), Some(4));
        assert_eq!(index.column(LeadField::Assignee), Some(5));
        assert!(index.require(&LeadField::REQUIRED).is_ok());
    }

    #[test]
    fn test_header_priority_prefers_specific_spelling() {
        let row = header(&["Price", "Total Price"]);
        let index = HeaderIndex::resolve("Leads", &row, &LeadField::ALL);
        assert_eq!(index.column(LeadField::TotalPrice), Some(1));
    }

    #[test]
    fn test_missing_required_column_names_field() {
        let row = header(&["Name", "Product", "Quantity", "Status"]);
        let index = HeaderIndex::resolve("Leads", &row, &LeadField::ALL);
        let err = index.require(&LeadField::REQUIRED).unwrap_err();
        assert!(err.to_string().contains("assignee"));
    }

    #[test]
    fn test_layout_places_values_by_header() {
        let row = header(&["Quantity", "Type", "Product Name"]);
        let index = HeaderIndex::resolve("M", &row, &MovementField::ALL);
        let laid = index.layout(&[
            (MovementField::ProductName, "Widget".into()),
            (MovementField::Quantity, "-2".into()),
            (MovementField::Reason, "ignored".into()),
        ]);
        assert_eq!(laid, vec!["-2", "", "Widget"]);
    }

    #[test]
    fn test_parse_count_tolerates_formatting() {
        assert_eq!(parse_count("1,200"), Some(1200));
        assert_eq!(parse_count("\u{0661}\u{0660}"), Some(10));
        assert_eq!(parse_count("7.0"), Some(7));
        assert_eq!(parse_count(""), None);
    }

    #[test]
    fn test_timestamp_formats() {
        let at = parse_timestamp("2024-05-01T10:00:00Z").unwrap();
        assert_eq!(format_timestamp(at), "2024-05-01T10:00:00Z");
        assert!(parse_timestamp("2024-05-01 10:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
