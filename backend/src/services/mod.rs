//! Business logic services for the Lead CRM

pub mod assignment;
pub mod auth;
pub mod ledger;
pub mod orders;
pub mod shipping;
pub mod stock;

pub use assignment::{AssignmentGate, AssignmentService};
pub use auth::AuthService;
pub use ledger::SheetLedger;
pub use orders::OrderService;
pub use shipping::ShippingCoordinator;
pub use stock::StockService;
