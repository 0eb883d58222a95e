//! Lead (customer order) models

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::types::RowNumber;

/// One customer order row in the lead ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    /// Sheet row of the lead; immutable identity
    pub row_number: RowNumber,
    pub order_date: String,
    pub customer_name: String,
    pub phone: String,
    pub whatsapp: String,
    pub governorate: String,
    pub area: String,
    pub address: String,
    pub product: String,
    /// Free-text quantity as entered by the intake process
    pub quantity: String,
    /// Free-text total price as entered by the intake process
    pub total_price: String,
    pub status: LeadStatus,
    pub notes: String,
    pub source: String,
    pub assignee: Option<String>,
}

impl Lead {
    pub fn is_unassigned(&self) -> bool {
        self.assignee.is_none()
    }

    pub fn is_assigned_to(&self, username: &str) -> bool {
        self.assignee
            .as_deref()
            .map(|a| a.eq_ignore_ascii_case(username))
            .unwrap_or(false)
    }
}

/// Lifecycle status of a lead
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum LeadStatus {
    #[default]
    New,
    Confirmed,
    PendingConfirmation,
    Rejected,
    NoAnswer,
    ContactedViaWhatsapp,
    Shipped,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 7] = [
        LeadStatus::New,
        LeadStatus::Confirmed,
        LeadStatus::PendingConfirmation,
        LeadStatus::Rejected,
        LeadStatus::NoAnswer,
        LeadStatus::ContactedViaWhatsapp,
        LeadStatus::Shipped,
    ];

    /// Slug written to the ledger
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Confirmed => "confirmed",
            LeadStatus::PendingConfirmation => "pending-confirmation",
            LeadStatus::Rejected => "rejected",
            LeadStatus::NoAnswer => "no-answer",
            LeadStatus::ContactedViaWhatsapp => "contacted-via-whatsapp",
            LeadStatus::Shipped => "shipped",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            LeadStatus::New => "New",
            LeadStatus::Confirmed => "Confirmed",
            LeadStatus::PendingConfirmation => "Pending Confirmation",
            LeadStatus::Rejected => "Rejected",
            LeadStatus::NoAnswer => "No Answer",
            LeadStatus::ContactedViaWhatsapp => "Contacted via WhatsApp",
            LeadStatus::Shipped => "Shipped",
        }
    }

    pub fn is_shipped(&self) -> bool {
        matches!(self, LeadStatus::Shipped)
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown lead status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for LeadStatus {
    type Err = ParseStatusError;

    /// Accepts slugs, labels, and `_`/space separated variants in any case.
    /// An empty cell is a new lead.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_lowercase()
            .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");

        if key.is_empty() {
            return Ok(LeadStatus::New);
        }

        let status = match key.as_str() {
            "new" => LeadStatus::New,
            "confirmed" => LeadStatus::Confirmed,
            "pending-confirmation" | "pending" => LeadStatus::PendingConfirmation,
            "rejected" => LeadStatus::Rejected,
            "no-answer" => LeadStatus::NoAnswer,
            "contacted-via-whatsapp" | "whatsapp" => LeadStatus::ContactedViaWhatsapp,
            "shipped" => LeadStatus::Shipped,
            _ => return Err(ParseStatusError(s.trim().to_string())),
        };

        Ok(status)
    }
}
