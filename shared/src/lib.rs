//! Shared types and models for the Lead CRM
//!
//! This crate contains the domain records read from and written to the
//! spreadsheet ledger, plus the boundary parsing used to turn loosely-typed
//! cells into them.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
