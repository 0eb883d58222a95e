//! Inventory models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::types::RowNumber;

/// Current inventory for one product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockItem {
    pub row_number: RowNumber,
    /// Canonical product name
    pub product_name: String,
    pub initial_quantity: i64,
    pub current_quantity: i64,
    pub last_update: Option<DateTime<Utc>>,
    /// Alternate names that resolve to this item
    pub synonyms: Vec<String>,
    /// Alert floor
    pub min_threshold: Option<i64>,
}

impl StockItem {
    pub fn is_low(&self) -> bool {
        self.min_threshold
            .map(|threshold| self.current_quantity <= threshold)
            .unwrap_or(false)
    }
}

/// An immutable audit record of one quantity change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockMovement {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub product_name: String,
    pub movement_type: MovementType,
    /// Signed quantity delta applied to the item
    pub quantity: i64,
    pub order_id: Option<RowNumber>,
    pub reason: String,
    pub notes: String,
}

/// Types of stock movements
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Sale,
    Return,
    Damage,
    Loss,
    Initial,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Sale => "sale",
            MovementType::Return => "return",
            MovementType::Damage => "damage",
            MovementType::Loss => "loss",
            MovementType::Initial => "initial",
            MovementType::Adjustment => "adjustment",
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sale" => Ok(MovementType::Sale),
            "return" => Ok(MovementType::Return),
            "damage" => Ok(MovementType::Damage),
            "loss" => Ok(MovementType::Loss),
            "initial" => Ok(MovementType::Initial),
            "adjustment" => Ok(MovementType::Adjustment),
            other => Err(format!("unknown movement type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_stock_threshold() {
        let mut item = StockItem {
            row_number: 2,
            product_name: "Widget".to_string(),
            initial_quantity: 10,
            current_quantity: 3,
            last_update: None,
            synonyms: vec![],
            min_threshold: Some(3),
        };
        assert!(item.is_low());

        item.current_quantity = 4;
        assert!(!item.is_low());

        item.min_threshold = None;
        item.current_quantity = 0;
        assert!(!item.is_low());
    }

    #[test]
    fn test_movement_type_round_trips_through_ledger_text() {
        for kind in [
            MovementType::Sale,
            MovementType::Return,
            MovementType::Damage,
            MovementType::Loss,
            MovementType::Initial,
            MovementType::Adjustment,
        ] {
            assert_eq!(kind.as_str().parse::<MovementType>(), Ok(kind));
        }
    }
}
