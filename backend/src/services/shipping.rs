//! Shipping coordinator
//!
//! Marking orders shipped is a two-step saga per order: write the status,
//! then deduct stock. The store has no transactions, so a failed step is
//! compensated by writing back the status captured before the batch.
//!
//! Bulk requests are planned in full before anything is written. Demand is
//! summed per product and stock is allotted in ascending row order; once an
//! order of a product does not fit, every later order of that product is
//! rejected too.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::ledger::{LeadTable, SheetLedger};
use crate::services::stock::{resolve_product, StockDeduction, StockError, StockService};
use shared::{parse_quantity, Lead, LeadStatus, RowNumber, StockItem};

/// Why an order was rejected before any mutation
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    UnknownOrder,
    NotPermitted,
    AlreadyShipped,
    ProductNotFound,
    InvalidQuantity,
    InsufficientStock,
}

/// An order cleared for shipping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedShipment {
    pub row_number: RowNumber,
    /// Canonical stock item name
    pub product_name: String,
    pub quantity: i64,
    pub original_status: LeadStatus,
}

/// An order that failed pre-validation
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RejectedOrder {
    pub row_number: RowNumber,
    pub product: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    pub reason: RejectReason,
    pub message: String,
    /// Stock left for this order after earlier orders took their share
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_quantity: Option<i64>,
}

/// Demand against one product in a batch
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProductImpact {
    pub product: String,
    /// Sum over every resolvable order of the product
    pub requested: i64,
    /// Quantity at the start of the batch
    pub available: i64,
    /// Sum over the orders cleared by the plan
    pub allotted: i64,
    /// Actually deducted by the apply pass
    pub deducted: i64,
}

/// Classification of a batch; nothing has been written yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentPlan {
    pub satisfiable: Vec<PlannedShipment>,
    pub rejected: Vec<RejectedOrder>,
    pub products: Vec<ProductImpact>,
}

pub(crate) fn reject(
    row_number: RowNumber,
    product: &str,
    quantity: Option<i64>,
    reason: RejectReason,
    message: impl Into<String>,
) -> RejectedOrder {
    RejectedOrder {
        row_number,
        product: product.to_string(),
        quantity,
        reason,
        message: message.into(),
        available_quantity: None,
    }
}

/// Classify every requested order as satisfiable or rejected.
///
/// Pure and deterministic: rows are deduplicated and processed in ascending
/// order, products in name order.
pub fn plan_shipments(leads: &[Lead], rows: &[RowNumber], stock: &[StockItem]) -> ShipmentPlan {
    let rows: BTreeSet<RowNumber> = rows.iter().copied().collect();
    let mut rejected = Vec::new();
    // canonical product -> (available, orders in row order)
    let mut demand: BTreeMap<String, (i64, Vec<PlannedShipment>)> = BTreeMap::new();

    for row_number in rows {
        let Some(lead) = leads.iter().find(|l| l.row_number == row_number) else {
            rejected.push(reject(row_number, "", None, RejectReason::UnknownOrder, "Order not found"));
            continue;
        };

        if lead.status.is_shipped() {
            rejected.push(reject(
                row_number,
                &lead.product,
                None,
                RejectReason::AlreadyShipped,
                "Order is already shipped",
            ));
            continue;
        }

        let quantity = match parse_quantity(&lead.quantity) {
            Ok(quantity) => quantity,
            Err(message) => {
                rejected.push(reject(
                    row_number,
                    &lead.product,
                    None,
                    RejectReason::InvalidQuantity,
                    message,
                ));
                continue;
            }
        };

        let Some(item) = resolve_product(stock, &lead.product) else {
            rejected.push(reject(
                row_number,
                &lead.product,
                Some(quantity),
                RejectReason::ProductNotFound,
                format!("Product not found: {}", lead.product),
            ));
            continue;
        };

        demand
            .entry(item.product_name.clone())
            .or_insert_with(|| (item.current_quantity, Vec::new()))
            .1
            .push(PlannedShipment {
                row_number,
                product_name: item.product_name.clone(),
                quantity,
                original_status: lead.status,
            });
    }

    let mut satisfiable = Vec::new();
    let mut products = Vec::with_capacity(demand.len());

    for (product, (available, orders)) in demand {
        let requested = orders
            .iter()
            .fold(0i64, |total, o| total.saturating_add(o.quantity));
        let mut remaining = available;
        let mut exhausted = false;

        for order in orders {
            if !exhausted && order.quantity <= remaining {
                remaining -= order.quantity;
                satisfiable.push(order);
            } else {
                exhausted = true;
                rejected.push(RejectedOrder {
                    row_number: order.row_number,
                    product: product.clone(),
                    quantity: Some(order.quantity),
                    reason: RejectReason::InsufficientStock,
                    message: format!(
                        "Insufficient stock for {}: requested {}, available {}",
                        product, order.quantity, remaining
                    ),
                    available_quantity: Some(remaining),
                });
            }
        }

        products.push(ProductImpact {
            product,
            requested,
            available,
            allotted: available - remaining,
            deducted: 0,
        });
    }

    satisfiable.sort_by_key(|s| s.row_number);
    rejected.sort_by_key(|r| r.row_number);

    ShipmentPlan {
        satisfiable,
        rejected,
        products,
    }
}

/// An order shipped with its stock deducted
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ShippedOrder {
    pub row_number: RowNumber,
    pub product_name: String,
    pub quantity: i64,
    pub remaining_quantity: i64,
    pub movement_id: Uuid,
}

/// An order that was marked shipped and then compensated
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RevertedOrder {
    pub row_number: RowNumber,
    pub product_name: String,
    pub quantity: i64,
    pub original_status: LeadStatus,
    /// The failure is the user's to fix (stock) rather than a retry
    pub stock_error: bool,
    pub retryable: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_quantity: Option<i64>,
    pub status_reverted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_warning: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentOutcome {
    Complete,
    Partial,
    NoneShipped,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ShipmentCounts {
    pub requested: usize,
    pub shipped: usize,
    pub rejected: usize,
    pub reverted: usize,
}

/// Result of a bulk shipment. Partial success is a normal outcome.
#[derive(Debug, Clone, Serialize)]
pub struct BulkShipmentReport {
    pub outcome: ShipmentOutcome,
    pub shipped: Vec<ShippedOrder>,
    pub rejected: Vec<RejectedOrder>,
    pub reverted: Vec<RevertedOrder>,
    pub products: Vec<ProductImpact>,
    pub counts: ShipmentCounts,
    pub summary: String,
}

impl BulkShipmentReport {
    fn new(
        shipped: Vec<ShippedOrder>,
        rejected: Vec<RejectedOrder>,
        reverted: Vec<RevertedOrder>,
        products: Vec<ProductImpact>,
    ) -> Self {
        let counts = ShipmentCounts {
            requested: shipped.len() + rejected.len() + reverted.len(),
            shipped: shipped.len(),
            rejected: rejected.len(),
            reverted: reverted.len(),
        };
        let outcome = if counts.shipped == 0 {
            ShipmentOutcome::NoneShipped
        } else if counts.rejected == 0 && counts.reverted == 0 {
            ShipmentOutcome::Complete
        } else {
            ShipmentOutcome::Partial
        };

        let mut summary = format!(
            "{} of {} orders shipped, {} failed validation, {} reverted",
            counts.shipped, counts.requested, counts.rejected, counts.reverted
        );
        for product in products.iter().filter(|p| p.deducted > 0) {
            summary.push_str(&format!(
                "; {}: -{} ({} left)",
                product.product,
                product.deducted,
                product.available - product.deducted
            ));
        }

        Self {
            outcome,
            shipped,
            rejected,
            reverted,
            products,
            counts,
            summary,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new(), Vec::new())
    }

    /// Fold in orders rejected before the coordinator saw them
    pub fn with_rejected(self, mut extra: Vec<RejectedOrder>) -> Self {
        if extra.is_empty() {
            return self;
        }
        let mut rejected = self.rejected;
        rejected.append(&mut extra);
        rejected.sort_by_key(|r| r.row_number);
        Self::new(self.shipped, rejected, self.reverted, self.products)
    }
}

/// Result of shipping one order
#[derive(Debug, Clone, Serialize)]
pub struct SingleShipment {
    pub row_number: RowNumber,
    /// Order was already shipped; nothing was written
    pub already_shipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deduction: Option<StockDeduction>,
}

/// Why the apply step for one order failed
enum StepFailure {
    StatusWrite(AppError),
    Deduction(StockError),
}

/// Shipping coordinator
#[derive(Clone)]
pub struct ShippingCoordinator {
    ledger: SheetLedger,
    stock: StockService,
}

impl ShippingCoordinator {
    pub fn new(ledger: SheetLedger, stock: StockService) -> Self {
        Self { ledger, stock }
    }

    /// Ship a batch of orders
    pub async fn ship_bulk(&self, rows: &[RowNumber]) -> AppResult<BulkShipmentReport> {
        let (leads, stock) =
            tokio::try_join!(self.ledger.read_leads(), self.ledger.read_stock())?;
        let plan = plan_shipments(&leads.leads, rows, &stock.items);

        tracing::info!(
            satisfiable = plan.satisfiable.len(),
            rejected = plan.rejected.len(),
            "Bulk shipment planned"
        );

        let mut products = plan.products;
        let mut shipped = Vec::new();
        let mut reverted = Vec::new();

        for shipment in plan.satisfiable {
            match self.apply(&leads, &shipment).await {
                Ok(deduction) => {
                    if let Some(impact) = products
                        .iter_mut()
                        .find(|p| p.product == shipment.product_name)
                    {
                        impact.deducted += deduction.deducted;
                    }
                    shipped.push(ShippedOrder {
                        row_number: shipment.row_number,
                        product_name: deduction.product_name,
                        quantity: deduction.deducted,
                        remaining_quantity: deduction.remaining_quantity,
                        movement_id: deduction.movement_id,
                    });
                }
                Err(failure) => {
                    let (reverted_ok, warning) = self.revert(&leads, &shipment).await;
                    reverted.push(reverted_order(&shipment, failure, reverted_ok, warning));
                }
            }
        }

        let report = BulkShipmentReport::new(shipped, plan.rejected, reverted, products);
        tracing::info!(outcome = ?report.outcome, summary = %report.summary, "Bulk shipment finished");
        Ok(report)
    }

    /// Ship one order. Product and quantity are checked before anything is
    /// written; a failed deduction reverts the status.
    pub async fn ship_single(&self, row: RowNumber) -> AppResult<SingleShipment> {
        let (leads, stock) =
            tokio::try_join!(self.ledger.read_leads(), self.ledger.read_stock())?;
        let lead = leads
            .get(row)
            .ok_or_else(|| AppError::NotFound(format!("Order {}", row)))?;

        if lead.status.is_shipped() {
            tracing::debug!(row, "Order already shipped");
            return Ok(SingleShipment {
                row_number: row,
                already_shipped: true,
                deduction: None,
            });
        }

        let shipment = prepare_single(lead, &stock.items)?;

        match self.apply(&leads, &shipment).await {
            Ok(deduction) => Ok(SingleShipment {
                row_number: row,
                already_shipped: false,
                deduction: Some(deduction),
            }),
            Err(failure) => {
                let (reverted, revert_warning) = self.revert(&leads, &shipment).await;
                let error = match failure {
                    StepFailure::Deduction(error) => error,
                    StepFailure::StatusWrite(error) => StockError::System(error.to_string()),
                };
                Err(AppError::Stock {
                    error,
                    status_reverted: Some(reverted),
                    revert_warning,
                })
            }
        }
    }

    /// Check that a lead could ship against current stock without writing
    /// anything. Used to validate a patched lead before its fields land.
    pub async fn check_shippable(&self, lead: &Lead) -> AppResult<()> {
        if lead.status.is_shipped() {
            return Ok(());
        }
        let stock = self.ledger.read_stock().await?;
        prepare_single(lead, &stock.items).map(|_| ())
    }

    /// Mark shipped, then deduct
    async fn apply(
        &self,
        leads: &LeadTable,
        shipment: &PlannedShipment,
    ) -> Result<StockDeduction, StepFailure> {
        self.ledger
            .write_status(leads, shipment.row_number, LeadStatus::Shipped)
            .await
            .map_err(StepFailure::StatusWrite)?;

        self.stock
            .deduct(&shipment.product_name, shipment.quantity, shipment.row_number)
            .await
            .map_err(StepFailure::Deduction)
    }

    /// Write back the captured status. Never fails; a failed compensation is
    /// returned as a warning.
    async fn revert(&self, leads: &LeadTable, shipment: &PlannedShipment) -> (bool, Option<String>) {
        match self
            .ledger
            .write_status(leads, shipment.row_number, shipment.original_status)
            .await
        {
            Ok(()) => {
                tracing::warn!(
                    row = shipment.row_number,
                    status = %shipment.original_status.as_str(),
                    "Shipment reverted to original status"
                );
                (true, None)
            }
            Err(e) => {
                tracing::error!(
                    row = shipment.row_number,
                    status = %shipment.original_status.as_str(),
                    error = %e,
                    "Status revert failed; order needs manual correction"
                );
                (
                    false,
                    Some(format!(
                        "Could not restore status '{}': {}",
                        shipment.original_status.as_str(),
                        e
                    )),
                )
            }
        }
    }
}

/// Resolve the product and quantity of one order
fn prepare_single(lead: &Lead, stock: &[StockItem]) -> AppResult<PlannedShipment> {
    let quantity =
        parse_quantity(&lead.quantity).map_err(|msg| AppError::validation("quantity", msg))?;
    let item = resolve_product(stock, &lead.product).ok_or_else(|| {
        AppError::from(StockError::ProductNotFound {
            product: lead.product.clone(),
        })
    })?;

    Ok(PlannedShipment {
        row_number: lead.row_number,
        product_name: item.product_name.clone(),
        quantity,
        original_status: lead.status,
    })
}

fn reverted_order(
    shipment: &PlannedShipment,
    failure: StepFailure,
    status_reverted: bool,
    revert_warning: Option<String>,
) -> RevertedOrder {
    let (stock_error, retryable, message, available_quantity) = match failure {
        StepFailure::Deduction(error) => {
            let available = match &error {
                StockError::InsufficientStock { available, .. } => Some(*available),
                _ => None,
            };
            (
                error.is_user_actionable(),
                !error.is_user_actionable(),
                error.to_string(),
                available,
            )
        }
        StepFailure::StatusWrite(error) => (false, true, error.to_string(), None),
    };

    RevertedOrder {
        row_number: shipment.row_number,
        product_name: shipment.product_name.clone(),
        quantity: shipment.quantity,
        original_status: shipment.original_status,
        stock_error,
        retryable,
        message,
        available_quantity,
        status_reverted,
        revert_warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(row: RowNumber, product: &str, quantity: &str, status: LeadStatus) -> Lead {
        Lead {
            row_number: row,
            order_date: String::new(),
            customer_name: format!("Customer {}", row),
            phone: String::new(),
            whatsapp: String::new(),
            governorate: String::new(),
            area: String::new(),
            address: String::new(),
            product: product.to_string(),
            quantity: quantity.to_string(),
            total_price: String::new(),
            status,
            notes: String::new(),
            source: String::new(),
            assignee: None,
        }
    }

    fn item(name: &str, quantity: i64) -> StockItem {
        StockItem {
            row_number: 2,
            product_name: name.to_string(),
            initial_quantity: quantity,
            current_quantity: quantity,
            last_update: None,
            synonyms: Vec::new(),
            min_threshold: None,
        }
    }

    #[test]
    fn test_plan_fifo_per_product() {
        let leads = vec![
            lead(2, "Widget", "5", LeadStatus::Confirmed),
            lead(3, "Widget", "5", LeadStatus::Confirmed),
            lead(4, "Widget", "1", LeadStatus::Confirmed),
        ];
        let plan = plan_shipments(&leads, &[4, 3, 2], &[item("Widget", 7)]);

        let shipped: Vec<_> = plan.satisfiable.iter().map(|s| s.row_number).collect();
        assert_eq!(shipped, vec![2]);

        // Row 4 would fit but may not jump ahead of row 3
        let rejected: Vec<_> = plan.rejected.iter().map(|r| r.row_number).collect();
        assert_eq!(rejected, vec![3, 4]);
        assert_eq!(plan.rejected[0].available_quantity, Some(2));

        assert_eq!(plan.products[0].requested, 11);
        assert_eq!(plan.products[0].allotted, 5);
    }

    #[test]
    fn test_plan_rejections() {
        let leads = vec![
            lead(2, "Widget", "abc", LeadStatus::New),
            lead(3, "Sprocket", "1", LeadStatus::New),
            lead(4, "Widget", "1", LeadStatus::Shipped),
        ];
        let plan = plan_shipments(&leads, &[2, 3, 4, 9], &[item("Widget", 7)]);

        assert!(plan.satisfiable.is_empty());
        let reasons: Vec<_> = plan.rejected.iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![
                RejectReason::InvalidQuantity,
                RejectReason::ProductNotFound,
                RejectReason::AlreadyShipped,
                RejectReason::UnknownOrder,
            ]
        );
    }

    #[test]
    fn test_plan_refuses_oversized_quantities() {
        let leads = vec![
            lead(2, "Widget", "9223372036854775807", LeadStatus::New),
            lead(3, "Widget", "9223372036854775807", LeadStatus::New),
            lead(4, "Widget", "2", LeadStatus::New),
        ];
        let plan = plan_shipments(&leads, &[2, 3, 4], &[item("Widget", 7)]);

        let shipped: Vec<_> = plan.satisfiable.iter().map(|s| s.row_number).collect();
        assert_eq!(shipped, vec![4]);
        assert_eq!(plan.rejected.len(), 2);
        assert!(plan
            .rejected
            .iter()
            .all(|r| r.reason == RejectReason::InvalidQuantity));
        assert_eq!(plan.products[0].requested, 2);
    }

    #[test]
    fn test_prepare_single_resolves_synonym_product() {
        let mut widget = item("Widget", 7);
        widget.synonyms = vec!["wdg".into()];
        let shipment = prepare_single(&lead(5, "WDG", "3", LeadStatus::Confirmed), &[widget]).unwrap();
        assert_eq!(shipment.product_name, "Widget");
        assert_eq!(shipment.quantity, 3);
        assert_eq!(shipment.original_status, LeadStatus::Confirmed);

        assert!(matches!(
            prepare_single(&lead(5, "Sprocket", "1", LeadStatus::New), &[item("Widget", 7)]),
            Err(AppError::Stock {
                error: StockError::ProductNotFound { .. },
                ..
            })
        ));
        assert!(matches!(
            prepare_single(&lead(5, "Widget", "2000000", LeadStatus::New), &[item("Widget", 7)]),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn test_plan_deduplicates_rows() {
        let leads = vec![lead(2, "Widget", "4", LeadStatus::New)];
        let plan = plan_shipments(&leads, &[2, 2], &[item("Widget", 7)]);
        assert_eq!(plan.satisfiable.len(), 1);
        assert!(plan.rejected.is_empty());
    }

    #[test]
    fn test_report_outcomes() {
        let report = BulkShipmentReport::new(Vec::new(), Vec::new(), Vec::new(), Vec::new());
        assert_eq!(report.outcome, ShipmentOutcome::NoneShipped);

        let shipped = vec![ShippedOrder {
            row_number: 2,
            product_name: "Widget".into(),
            quantity: 1,
            remaining_quantity: 3,
            movement_id: Uuid::nil(),
        }];
        let report = BulkShipmentReport::new(shipped.clone(), Vec::new(), Vec::new(), Vec::new());
        assert_eq!(report.outcome, ShipmentOutcome::Complete);

        let rejected = vec![reject(3, "Widget", Some(9), RejectReason::InsufficientStock, "no")];
        let report = BulkShipmentReport::new(shipped, rejected, Vec::new(), Vec::new());
        assert_eq!(report.outcome, ShipmentOutcome::Partial);
        assert!(report.summary.starts_with("1 of 2 orders shipped"));
    }
}
