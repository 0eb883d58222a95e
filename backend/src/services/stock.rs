//! Stock ledger service: product resolution, deductions and movements
//!
//! This service is the only writer of `current_quantity`. Every change runs
//! under one process-wide lock as read, validate, write, log; a failed log
//! append compensates the quantity write so no change goes unrecorded.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::ledger::SheetLedger;
use shared::{
    normalize_name, validate_product_name, MovementType, RowNumber, StockItem, StockMovement,
    MAX_QUANTITY,
};

/// Why a stock change was refused
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StockError {
    #[error("Product not found: {product}")]
    ProductNotFound { product: String },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Insufficient stock for {product}: requested {requested}, available {available}")]
    InsufficientStock {
        product: String,
        requested: i64,
        available: i64,
    },

    #[error("Stock ledger error: {0}")]
    System(String),
}

impl StockError {
    /// Whether the user can fix this (as opposed to retrying later)
    pub fn is_user_actionable(&self) -> bool {
        !matches!(self, StockError::System(_))
    }

    fn system(error: AppError) -> Self {
        StockError::System(error.to_string())
    }
}

/// Result of a successful sale deduction
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StockDeduction {
    pub product_name: String,
    pub deducted: i64,
    pub previous_quantity: i64,
    pub remaining_quantity: i64,
    pub movement_id: Uuid,
}

/// Result of an admin stock change
#[derive(Debug, Clone, Serialize)]
pub struct StockChange {
    pub product_name: String,
    pub previous_quantity: i64,
    pub current_quantity: i64,
    pub requested_delta: i64,
    pub applied_delta: i64,
    /// The requested decrement would have gone below zero
    pub clamped: bool,
    pub movement: StockMovement,
}

/// What to do when a decrement exceeds the available quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shortfall {
    Reject,
    Clamp,
}

struct ChangeRequest<'a> {
    product: &'a str,
    delta: i64,
    movement_type: MovementType,
    shortfall: Shortfall,
    order_id: Option<RowNumber>,
    reason: String,
    notes: String,
}

/// Kind of write-off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOffKind {
    Damage,
    Loss,
}

/// Input for creating a stock item
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 120))]
    pub product_name: String,
    #[validate(range(min = 0, max = 1000000))]
    pub initial_quantity: i64,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[validate(range(min = 0))]
    pub min_threshold: Option<i64>,
}

/// Input for updating a stock item's metadata
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1))]
    pub product_name: String,
    pub synonyms: Option<Vec<String>>,
    #[validate(range(min = 0))]
    pub min_threshold: Option<i64>,
    /// Remove the threshold entirely
    #[serde(default)]
    pub clear_threshold: bool,
}

/// Input for returns, damage and loss
#[derive(Debug, Deserialize, Validate)]
pub struct StockEventInput {
    #[validate(length(min = 1))]
    pub product_name: String,
    #[validate(range(min = 1, max = 1000000))]
    pub quantity: i64,
    #[serde(default)]
    pub reason: String,
    pub order_id: Option<RowNumber>,
    #[serde(default)]
    pub notes: String,
}

/// Input for a manual correction
#[derive(Debug, Deserialize, Validate)]
pub struct AdjustInput {
    #[validate(length(min = 1))]
    pub product_name: String,
    pub delta: i64,
    #[validate(length(min = 1))]
    pub reason: String,
}

/// Stock service
#[derive(Clone)]
pub struct StockService {
    ledger: SheetLedger,
    write_lock: Arc<Mutex<()>>,
}

/// Every name an item answers to, normalized
fn item_tokens(item: &StockItem) -> impl Iterator<Item = String> + '_ {
    std::iter::once(&item.product_name)
        .chain(item.synonyms.iter())
        .map(|name| normalize_name(name))
        .filter(|token| !token.is_empty())
}

/// Match a free-text product name against canonical names and synonyms.
///
/// Exact matches win; otherwise a token contained in the name (or the name
/// contained in a token) matches. More than one item at the deciding stage
/// is ambiguous and resolves to nothing.
pub fn resolve_product<'a>(items: &'a [StockItem], name: &str) -> Option<&'a StockItem> {
    let needle = normalize_name(name);
    if needle.is_empty() {
        return None;
    }

    let exact: Vec<&StockItem> = items
        .iter()
        .filter(|item| item_tokens(item).any(|token| token == needle))
        .collect();
    match exact.len() {
        1 => return Some(exact[0]),
        0 => {}
        _ => {
            tracing::warn!(product = name, matches = exact.len(), "Ambiguous product name");
            return None;
        }
    }

    if needle.chars().count() < 2 {
        return None;
    }
    let partial: Vec<&StockItem> = items
        .iter()
        .filter(|item| {
            item_tokens(item).any(|token| {
                token.chars().count() >= 2 && (needle.contains(&token) || token.contains(&needle))
            })
        })
        .collect();

    match partial.len() {
        1 => Some(partial[0]),
        0 => None,
        _ => {
            tracing::warn!(product = name, matches = partial.len(), "Ambiguous product name");
            None
        }
    }
}

impl StockService {
    pub fn new(ledger: SheetLedger) -> Self {
        Self {
            ledger,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Current stock items
    pub async fn list_stock(&self) -> AppResult<Vec<StockItem>> {
        Ok(self.ledger.read_stock().await?.items)
    }

    /// Items at or below their alert threshold
    pub async fn low_stock(&self) -> AppResult<Vec<StockItem>> {
        Ok(self
            .list_stock()
            .await?
            .into_iter()
            .filter(StockItem::is_low)
            .collect())
    }

    /// Resolve a free-text product name against the current ledger
    pub async fn resolve(&self, name: &str) -> AppResult<Option<StockItem>> {
        let table = self.ledger.read_stock().await?;
        Ok(resolve_product(&table.items, name).cloned())
    }

    /// Movement log, newest first, optionally for one product
    pub async fn list_movements(
        &self,
        product: Option<&str>,
        limit: usize,
    ) -> AppResult<Vec<StockMovement>> {
        let product_name = match product {
            Some(name) => {
                let table = self.ledger.read_stock().await?;
                let canonical = resolve_product(&table.items, name)
                    .map(|item| item.product_name.clone())
                    .unwrap_or_else(|| name.to_string());
                Some(normalize_name(&canonical))
            }
            None => None,
        };

        let mut movements: Vec<StockMovement> = self
            .ledger
            .read_movements()
            .await?
            .into_iter()
            .filter(|m| {
                product_name
                    .as_ref()
                    .map(|p| normalize_name(&m.product_name) == *p)
                    .unwrap_or(true)
            })
            .collect();

        movements.reverse();
        movements.truncate(limit);
        Ok(movements)
    }

    /// Deduct stock for a shipped order.
    ///
    /// Rejects the whole quantity when it exceeds what is available; never
    /// deducts part of a line.
    pub async fn deduct(
        &self,
        product: &str,
        quantity: i64,
        order_id: RowNumber,
    ) -> Result<StockDeduction, StockError> {
        if quantity <= 0 {
            return Err(StockError::InvalidQuantity(format!(
                "quantity must be positive, got {}",
                quantity
            )));
        }

        let change = self
            .apply(ChangeRequest {
                product,
                delta: -quantity,
                movement_type: MovementType::Sale,
                shortfall: Shortfall::Reject,
                order_id: Some(order_id),
                reason: format!("Order #{} shipped", order_id),
                notes: String::new(),
            })
            .await?;

        Ok(StockDeduction {
            product_name: change.product_name,
            deducted: quantity,
            previous_quantity: change.previous_quantity,
            remaining_quantity: change.current_quantity,
            movement_id: change.movement.id,
        })
    }

    /// Manual correction; decrements floor at zero
    pub async fn adjust(&self, input: AdjustInput) -> AppResult<StockChange> {
        input.validate()?;
        if input.delta == 0 {
            return Err(AppError::validation("delta", "Adjustment must not be zero"));
        }
        if input.delta.unsigned_abs() > MAX_QUANTITY.unsigned_abs() {
            return Err(AppError::validation("delta", "Adjustment is too large"));
        }

        let change = self
            .apply(ChangeRequest {
                product: &input.product_name,
                delta: input.delta,
                movement_type: MovementType::Adjustment,
                shortfall: Shortfall::Clamp,
                order_id: None,
                reason: input.reason,
                notes: String::new(),
            })
            .await?;
        Ok(change)
    }

    /// Customer return: stock comes back
    pub async fn record_return(&self, input: StockEventInput) -> AppResult<StockChange> {
        input.validate()?;
        let reason = if input.reason.trim().is_empty() {
            match input.order_id {
                Some(order) => format!("Return of order #{}", order),
                None => "Customer return".to_string(),
            }
        } else {
            input.reason
        };

        let change = self
            .apply(ChangeRequest {
                product: &input.product_name,
                delta: input.quantity,
                movement_type: MovementType::Return,
                shortfall: Shortfall::Reject,
                order_id: input.order_id,
                reason,
                notes: input.notes,
            })
            .await?;
        Ok(change)
    }

    /// Damage or loss write-off, clamped at zero
    pub async fn record_write_off(
        &self,
        kind: WriteOffKind,
        input: StockEventInput,
    ) -> AppResult<StockChange> {
        input.validate()?;
        let (movement_type, default_reason) = match kind {
            WriteOffKind::Damage => (MovementType::Damage, "Damaged stock"),
            WriteOffKind::Loss => (MovementType::Loss, "Lost stock"),
        };
        let reason = if input.reason.trim().is_empty() {
            default_reason.to_string()
        } else {
            input.reason
        };

        let change = self
            .apply(ChangeRequest {
                product: &input.product_name,
                delta: -input.quantity,
                movement_type,
                shortfall: Shortfall::Clamp,
                order_id: input.order_id,
                reason,
                notes: input.notes,
            })
            .await?;

        if change.clamped {
            tracing::warn!(
                product = %change.product_name,
                requested = change.requested_delta,
                applied = change.applied_delta,
                "Write-off exceeded stock, clamped at zero"
            );
        }
        Ok(change)
    }

    /// Create a stock item and log its opening quantity
    pub async fn create_product(&self, input: CreateProductInput) -> AppResult<StockItem> {
        input.validate()?;
        validate_product_name(&input.product_name)
            .map_err(|msg| AppError::validation("product_name", msg))?;

        let _guard = self.write_lock.lock().await;
        let table = self.ledger.read_stock().await?;

        let synonyms: Vec<String> = input
            .synonyms
            .iter()
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|s| !s.is_empty())
            .collect();

        let new_tokens: Vec<String> = std::iter::once(&input.product_name)
            .chain(synonyms.iter())
            .map(|name| normalize_name(name))
            .collect();
        if let Some(existing) = table
            .items
            .iter()
            .find(|item| item_tokens(item).any(|token| new_tokens.contains(&token)))
        {
            return Err(AppError::DuplicateEntry(format!(
                "product name (conflicts with {})",
                existing.product_name
            )));
        }

        let now = Utc::now();
        let product_name = input.product_name.trim().to_string();
        let item = StockItem {
            row_number: 0,
            product_name: product_name.clone(),
            initial_quantity: input.initial_quantity,
            current_quantity: input.initial_quantity,
            last_update: Some(now),
            synonyms,
            min_threshold: input.min_threshold,
        };
        self.ledger.append_stock_item(&table, &item).await?;

        let movement = StockMovement {
            id: Uuid::new_v4(),
            timestamp: now,
            product_name: product_name.clone(),
            movement_type: MovementType::Initial,
            quantity: input.initial_quantity,
            order_id: None,
            reason: "Opening stock".to_string(),
            notes: String::new(),
        };
        if let Err(e) = self.ledger.append_movement(&movement).await {
            tracing::error!(product = %product_name, error = %e, "Product created but opening movement was not logged");
        }

        tracing::info!(product = %product_name, quantity = input.initial_quantity, "Stock item created");

        // Re-read so the caller gets the real row number
        let table = self.ledger.read_stock().await?;
        Ok(table
            .items
            .into_iter()
            .find(|i| normalize_name(&i.product_name) == normalize_name(&product_name))
            .unwrap_or(item))
    }

    /// Replace synonyms and/or threshold of an existing item
    pub async fn update_product(&self, input: UpdateProductInput) -> AppResult<StockItem> {
        input.validate()?;

        let _guard = self.write_lock.lock().await;
        let table = self.ledger.read_stock().await?;
        let mut item = resolve_product(&table.items, &input.product_name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Product {}", input.product_name)))?;

        if let Some(synonyms) = input.synonyms {
            let synonyms: Vec<String> = synonyms
                .iter()
                .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|s| !s.is_empty())
                .collect();
            let tokens: Vec<String> = synonyms.iter().map(|s| normalize_name(s)).collect();
            if let Some(other) = table.items.iter().find(|other| {
                other.row_number != item.row_number
                    && item_tokens(other).any(|token| tokens.contains(&token))
            }) {
                return Err(AppError::DuplicateEntry(format!(
                    "synonym (conflicts with {})",
                    other.product_name
                )));
            }
            item.synonyms = synonyms;
        }

        if input.clear_threshold {
            item.min_threshold = None;
        } else if let Some(threshold) = input.min_threshold {
            item.min_threshold = Some(threshold);
        }

        self.ledger.update_stock_metadata(&table, &item).await?;
        tracing::info!(product = %item.product_name, "Stock item updated");
        Ok(item)
    }

    /// Read, validate, write quantity, log movement; compensate on log failure
    async fn apply(&self, request: ChangeRequest<'_>) -> Result<StockChange, StockError> {
        let _guard = self.write_lock.lock().await;

        let table = self.ledger.read_stock().await.map_err(StockError::system)?;
        let item = resolve_product(&table.items, request.product)
            .cloned()
            .ok_or_else(|| StockError::ProductNotFound {
                product: request.product.to_string(),
            })?;

        let previous = item.current_quantity;
        let target = previous.checked_add(request.delta).ok_or_else(|| {
            StockError::InvalidQuantity(format!(
                "{} by {} is out of range for {}",
                previous, request.delta, item.product_name
            ))
        })?;
        let (current, clamped) = if target >= 0 {
            (target, false)
        } else {
            match request.shortfall {
                Shortfall::Reject => {
                    return Err(StockError::InsufficientStock {
                        product: item.product_name.clone(),
                        requested: -request.delta,
                        available: previous,
                    })
                }
                Shortfall::Clamp => (0, true),
            }
        };
        let applied_delta = current - previous;

        let now = Utc::now();
        self.ledger
            .write_stock_quantity(&table, &item, current, now)
            .await
            .map_err(StockError::system)?;

        let movement = StockMovement {
            id: Uuid::new_v4(),
            timestamp: now,
            product_name: item.product_name.clone(),
            movement_type: request.movement_type,
            quantity: applied_delta,
            order_id: request.order_id,
            reason: request.reason,
            notes: request.notes,
        };

        if let Err(log_error) = self.ledger.append_movement(&movement).await {
            tracing::error!(
                product = %item.product_name,
                error = %log_error,
                "Movement log append failed, restoring quantity"
            );
            if let Err(restore_error) = self
                .ledger
                .write_stock_quantity(&table, &item, previous, now)
                .await
            {
                tracing::error!(
                    product = %item.product_name,
                    quantity = previous,
                    error = %restore_error,
                    "Quantity restore failed; ledger needs manual reconciliation"
                );
            }
            return Err(StockError::system(log_error));
        }

        tracing::info!(
            product = %item.product_name,
            movement = %movement.movement_type,
            previous,
            current,
            order_id = ?request.order_id,
            "Stock changed"
        );

        Ok(StockChange {
            product_name: item.product_name,
            previous_quantity: previous,
            current_quantity: current,
            requested_delta: request.delta,
            applied_delta,
            clamped,
            movement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, synonyms: &[&str]) -> StockItem {
        StockItem {
            row_number: 2,
            product_name: name.to_string(),
            initial_quantity: 10,
            current_quantity: 10,
            last_update: None,
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
            min_threshold: None,
        }
    }

    #[test]
    fn test_resolve_exact_and_synonym() {
        let items = vec![item("Blue Widget", &["bw", "widget blue"]), item("Gadget", &[])];
        assert_eq!(resolve_product(&items, "  blue   WIDGET ").unwrap().product_name, "Blue Widget");
        assert_eq!(resolve_product(&items, "BW").unwrap().product_name, "Blue Widget");
        assert_eq!(resolve_product(&items, "gadget").unwrap().product_name, "Gadget");
    }

    #[test]
    fn test_resolve_substring() {
        let items = vec![item("Gadget", &[]), item("Blue Widget", &[])];
        assert_eq!(
            resolve_product(&items, "Gadget - promo pack").unwrap().product_name,
            "Gadget"
        );
    }

    #[test]
    fn test_resolve_ambiguous_is_not_found() {
        let items = vec![item("Widget Small", &[]), item("Widget Large", &[])];
        assert!(resolve_product(&items, "widget").is_none());
    }

    #[test]
    fn test_resolve_exact_beats_substring() {
        let items = vec![item("Widget", &[]), item("Widget Pro", &[])];
        assert_eq!(resolve_product(&items, "widget").unwrap().product_name, "Widget");
    }

    #[test]
    fn test_resolve_unknown() {
        let items = vec![item("Widget", &[])];
        assert!(resolve_product(&items, "Sprocket").is_none());
        assert!(resolve_product(&items, "").is_none());
    }

    #[test]
    fn test_stock_error_actionability() {
        assert!(StockError::InsufficientStock {
            product: "W".into(),
            requested: 2,
            available: 1
        }
        .is_user_actionable());
        assert!(!StockError::System("down".into()).is_user_actionable());
    }
}
