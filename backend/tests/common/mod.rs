//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use crm_backend::config::{Config, SheetsConfig};
use crm_backend::external::{LedgerStore, MemoryLedger};
use crm_backend::services::{
    AssignmentGate, AssignmentService, SheetLedger, ShippingCoordinator, StockService,
};

pub const LEADS: &str = "Leads";
pub const STOCK: &str = "Stock";
pub const MOVEMENTS: &str = "Stock Movements";
pub const SETTINGS: &str = "Settings";

/// Lead sheet columns used by the fixtures
pub const LEAD_HEADER: [&str; 6] = [
    "Customer Name",
    "Product",
    "Quantity",
    "Total Price",
    "Status",
    "Assignee",
];
pub const LEAD_STATUS_COL: usize = 4;
pub const LEAD_ASSIGNEE_COL: usize = 5;

pub const STOCK_HEADER: [&str; 6] = [
    "Product Name",
    "Initial Quantity",
    "Current Quantity",
    "Last Update",
    "Synonyms",
    "Min Threshold",
];
pub const STOCK_CURRENT_COL: usize = 2;

/// `(customer, product, quantity, status, assignee)`
pub type LeadSeed<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str);

/// `(product, current quantity, synonyms)`
pub type StockSeed<'a> = (&'a str, &'a str, &'a str);

pub fn memory_ledger(leads: &[LeadSeed], stock: &[StockSeed]) -> MemoryLedger {
    let mut lead_rows = vec![LEAD_HEADER.to_vec()];
    for &(customer, product, quantity, status, assignee) in leads {
        lead_rows.push(vec![customer, product, quantity, "100", status, assignee]);
    }

    let mut stock_rows = vec![STOCK_HEADER.to_vec()];
    for &(product, quantity, synonyms) in stock {
        stock_rows.push(vec![product, quantity, quantity, "", synonyms, ""]);
    }

    MemoryLedger::new()
        .with_sheet(LEADS, lead_rows)
        .with_sheet(STOCK, stock_rows)
}

pub fn sheet_ledger(store: &Arc<MemoryLedger>) -> SheetLedger {
    let store: Arc<dyn LedgerStore> = store.clone();
    SheetLedger::new(store, &SheetsConfig::default())
}

pub fn config_with_roster(roster: &[&str]) -> Config {
    let mut config = Config::default();
    config.assignment.employees = roster.iter().map(|s| s.to_string()).collect();
    config
}

pub fn assignment_service(
    store: &Arc<MemoryLedger>,
    roster: &[&str],
    cooldown: Duration,
) -> AssignmentService {
    AssignmentService::new(
        sheet_ledger(store),
        &config_with_roster(roster),
        AssignmentGate::new(cooldown),
    )
}

pub fn coordinator(store: &Arc<MemoryLedger>) -> (ShippingCoordinator, StockService) {
    let ledger = sheet_ledger(store);
    let stock = StockService::new(ledger.clone());
    (ShippingCoordinator::new(ledger, stock.clone()), stock)
}

pub async fn status_of(store: &MemoryLedger, row: u32) -> String {
    store.cell(LEADS, row, LEAD_STATUS_COL).await
}

pub async fn stock_of(store: &MemoryLedger, row: u32) -> String {
    store.cell(STOCK, row, STOCK_CURRENT_COL).await
}
