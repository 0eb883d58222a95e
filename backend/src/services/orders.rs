//! Order service: role-filtered listing, statistics and lead updates

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};
use crate::external::CellUpdate;
use crate::middleware::AuthUser;
use crate::services::assignment::{AssignmentReport, AssignmentService};
use crate::services::ledger::{LeadField, LeadTable, SheetLedger};
use crate::services::shipping::{
    reject, BulkShipmentReport, RejectReason, ShippingCoordinator, SingleShipment,
};
use shared::{parse_price, parse_quantity, Lead, LeadStatus, RowNumber};

/// Listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<String>,
    pub search: Option<String>,
}

/// Leads visible to the caller plus the side-effect assignment pass
#[derive(Debug, Serialize)]
pub struct OrderList {
    pub orders: Vec<Lead>,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<AssignmentReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_error: Option<String>,
}

/// Aggregated lead statistics
#[derive(Debug, Serialize, PartialEq)]
pub struct OrderStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_assignee: BTreeMap<String, usize>,
    pub unassigned: usize,
    /// Sum of parseable total prices over shipped leads
    pub shipped_revenue: Decimal,
}

/// Field changes for one lead. Absent fields are left alone; an empty
/// `assignee` clears the assignment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadPatch {
    #[serde(alias = "rowNumber")]
    pub row_number: RowNumber,
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub governorate: Option<String>,
    pub area: Option<String>,
    pub address: Option<String>,
    pub product: Option<String>,
    pub quantity: Option<String>,
    pub total_price: Option<String>,
    pub notes: Option<String>,
    pub source: Option<String>,
}

/// Result of a single lead update
#[derive(Debug, Serialize)]
pub struct OrderUpdate {
    pub order: Lead,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment: Option<SingleShipment>,
}

/// A row a bulk status change could not touch
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RowFailure {
    pub row_number: RowNumber,
    pub reason: String,
}

/// Result of a bulk change to a non-shipped status
#[derive(Debug, Serialize)]
pub struct BulkStatusUpdate {
    pub status: LeadStatus,
    pub updated: Vec<RowNumber>,
    pub failed: Vec<RowFailure>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BulkUpdate {
    Shipment(BulkShipmentReport),
    Status(BulkStatusUpdate),
}

fn parse_status(text: &str) -> AppResult<LeadStatus> {
    text.parse::<LeadStatus>()
        .map_err(|e| AppError::validation("status", e.to_string()))
}

fn visible_to<'a>(user: &'a AuthUser) -> impl Fn(&Lead) -> bool + 'a {
    move |lead| user.role.is_admin() || lead.is_assigned_to(&user.username)
}

fn matches_search(lead: &Lead, needle: &str) -> bool {
    [&lead.customer_name, &lead.phone, &lead.whatsapp, &lead.product]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Order service
#[derive(Clone)]
pub struct OrderService {
    ledger: SheetLedger,
    assignment: AssignmentService,
    shipping: ShippingCoordinator,
}

impl OrderService {
    pub fn new(
        ledger: SheetLedger,
        assignment: AssignmentService,
        shipping: ShippingCoordinator,
    ) -> Self {
        Self {
            ledger,
            assignment,
            shipping,
        }
    }

    /// Leads visible to the user. Runs the throttled assignment pass first so
    /// fresh leads show up already assigned.
    pub async fn list(&self, user: &AuthUser, filter: &OrderFilter) -> AppResult<OrderList> {
        let status = filter.status.as_deref().map(parse_status).transpose()?;
        let mut table = self.ledger.read_leads().await?;

        let (assignment, assignment_error) = match self.assignment.auto_assign(&mut table).await {
            Ok(report) => (Some(report), None),
            Err(e) => {
                tracing::warn!(error = %e, "Assignment during listing failed");
                (None, Some(e.to_string()))
            }
        };

        let needle = filter
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let orders: Vec<Lead> = table
            .leads
            .into_iter()
            .filter(visible_to(user))
            .filter(|lead| status.map(|s| lead.status == s).unwrap_or(true))
            .filter(|lead| needle.as_deref().map(|n| matches_search(lead, n)).unwrap_or(true))
            .collect();

        Ok(OrderList {
            total: orders.len(),
            orders,
            assignment,
            assignment_error,
        })
    }

    /// Statistics over the leads visible to the user
    pub async fn stats(&self, user: &AuthUser) -> AppResult<OrderStats> {
        let table = self.ledger.read_leads().await?;
        let can_see = visible_to(user);
        let visible: Vec<&Lead> = table.leads.iter().filter(|l| can_see(*l)).collect();

        let mut by_status: BTreeMap<String, usize> = LeadStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut by_assignee = BTreeMap::new();
        let mut unassigned = 0;
        let mut shipped_revenue = Decimal::ZERO;

        for lead in &visible {
            *by_status.entry(lead.status.as_str().to_string()).or_default() += 1;
            match &lead.assignee {
                Some(assignee) => *by_assignee.entry(assignee.clone()).or_default() += 1,
                None => unassigned += 1,
            }
            if lead.status.is_shipped() {
                match parse_price(&lead.total_price) {
                    Ok(price) => shipped_revenue += price,
                    Err(_) if lead.total_price.is_empty() => {}
                    Err(_) => {
                        tracing::debug!(row = lead.row_number, price = %lead.total_price, "Unparseable total price")
                    }
                }
            }
        }

        Ok(OrderStats {
            total: visible.len(),
            by_status,
            by_assignee,
            unassigned,
            shipped_revenue,
        })
    }

    /// Update one lead. A change to `shipped` runs the shipment path after
    /// the other fields are written.
    pub async fn update_single(&self, user: &AuthUser, patch: LeadPatch) -> AppResult<OrderUpdate> {
        let row = patch.row_number;
        let status = patch.status.as_deref().map(parse_status).transpose()?;
        if let Some(quantity) = &patch.quantity {
            parse_quantity(quantity).map_err(|msg| AppError::validation("quantity", msg))?;
        }

        let table = self.ledger.read_leads().await?;
        let mut lead = table
            .get(row)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Order {}", row)))?;

        if !user.role.is_admin() {
            if !lead.is_assigned_to(&user.username) {
                return Err(AppError::InsufficientPermissions);
            }
            if patch.assignee.is_some() {
                return Err(AppError::InsufficientPermissions);
            }
        }

        let mut updates = self.field_updates(&table, &mut lead, &patch)?;
        let ships = status == Some(LeadStatus::Shipped);

        if let Some(status) = status.filter(|s| !s.is_shipped()) {
            if lead.status.is_shipped() {
                tracing::info!(row, status = status.as_str(), "Order leaves shipped status; stock is not restored");
            }
            updates.push(table.update(row, LeadField::Status, status.as_str())?);
            lead.status = status;
        }

        // The patched product and quantity must ship before any field lands
        if ships && !updates.is_empty() {
            self.shipping.check_shippable(&lead).await?;
        }

        if !updates.is_empty() {
            self.ledger.write(&updates).await?;
            tracing::info!(row, fields = updates.len(), user = %user.username, "Order updated");
        }

        let shipment = if ships {
            let shipment = self.shipping.ship_single(row).await?;
            lead.status = LeadStatus::Shipped;
            Some(shipment)
        } else {
            None
        };

        Ok(OrderUpdate {
            order: lead,
            shipment,
        })
    }

    /// Change the status of many leads. `shipped` goes through the
    /// coordinator; other statuses are written in one batch.
    pub async fn update_bulk(
        &self,
        user: &AuthUser,
        rows: &[RowNumber],
        status: &str,
    ) -> AppResult<BulkUpdate> {
        if rows.is_empty() {
            return Err(AppError::validation("orders", "At least one order is required"));
        }
        let status = parse_status(status)?;
        let table = self.ledger.read_leads().await?;

        let mut permitted = Vec::new();
        let mut forbidden = Vec::new();
        let mut unknown = Vec::new();
        for &row in rows {
            match table.get(row) {
                None => unknown.push(row),
                Some(lead) if visible_to(user)(lead) => permitted.push(row),
                Some(_) => forbidden.push(row),
            }
        }
        permitted.sort_unstable();
        permitted.dedup();

        if status.is_shipped() {
            let report = if permitted.is_empty() && unknown.is_empty() {
                BulkShipmentReport::empty()
            } else {
                // Unknown rows are reported by the coordinator itself
                let mut rows = permitted.clone();
                rows.extend_from_slice(&unknown);
                self.shipping.ship_bulk(&rows).await?
            };
            let extra = forbidden
                .iter()
                .map(|&row| {
                    reject(
                        row,
                        "",
                        None,
                        RejectReason::NotPermitted,
                        "Order is assigned to another employee",
                    )
                })
                .collect();
            return Ok(BulkUpdate::Shipment(report.with_rejected(extra)));
        }

        let updates = permitted
            .iter()
            .map(|&row| table.update(row, LeadField::Status, status.as_str()))
            .collect::<AppResult<Vec<CellUpdate>>>()?;
        self.ledger.write(&updates).await?;

        tracing::info!(
            status = status.as_str(),
            updated = permitted.len(),
            user = %user.username,
            "Bulk status update"
        );

        let failed = unknown
            .into_iter()
            .map(|row| RowFailure {
                row_number: row,
                reason: "Order not found".to_string(),
            })
            .chain(forbidden.into_iter().map(|row| RowFailure {
                row_number: row,
                reason: "Order is assigned to another employee".to_string(),
            }))
            .collect();

        Ok(BulkUpdate::Status(BulkStatusUpdate {
            status,
            updated: permitted,
            failed,
        }))
    }

    /// Cell updates for every non-status field in the patch, applied to the
    /// in-memory lead as well
    fn field_updates(
        &self,
        table: &LeadTable,
        lead: &mut Lead,
        patch: &LeadPatch,
    ) -> AppResult<Vec<CellUpdate>> {
        let row = lead.row_number;
        let mut updates = Vec::new();

        let text_fields: [(LeadField, &Option<String>, &mut String); 11] = [
            (LeadField::CustomerName, &patch.customer_name, &mut lead.customer_name),
            (LeadField::Phone, &patch.phone, &mut lead.phone),
            (LeadField::Whatsapp, &patch.whatsapp, &mut lead.whatsapp),
            (LeadField::Governorate, &patch.governorate, &mut lead.governorate),
            (LeadField::Area, &patch.area, &mut lead.area),
            (LeadField::Address, &patch.address, &mut lead.address),
            (LeadField::Product, &patch.product, &mut lead.product),
            (LeadField::Quantity, &patch.quantity, &mut lead.quantity),
            (LeadField::TotalPrice, &patch.total_price, &mut lead.total_price),
            (LeadField::Notes, &patch.notes, &mut lead.notes),
            (LeadField::Source, &patch.source, &mut lead.source),
        ];
        for (field, value, target) in text_fields {
            if let Some(value) = value {
                let value = value.trim().to_string();
                updates.push(table.update(row, field, value.clone())?);
                *target = value;
            }
        }

        if let Some(assignee) = &patch.assignee {
            let assignee = assignee.trim();
            if assignee.is_empty() {
                updates.push(table.update(row, LeadField::Assignee, "")?);
                lead.assignee = None;
            } else {
                let member = self
                    .assignment
                    .roster()
                    .iter()
                    .find(|m| m.eq_ignore_ascii_case(assignee))
                    .cloned()
                    .ok_or_else(|| {
                        AppError::validation("assignee", format!("{} is not an employee", assignee))
                    })?;
                updates.push(table.update(row, LeadField::Assignee, member.clone())?);
                lead.assignee = Some(member);
            }
        }

        Ok(updates)
    }
}
