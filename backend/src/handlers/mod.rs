//! HTTP handlers

pub mod assignment;
pub mod auth;
pub mod health;
pub mod orders;
pub mod stock;

pub use assignment::assign_leads;
pub use auth::login;
pub use health::health_check;
pub use orders::{list_orders, update_orders};
pub use stock::{list_movements, list_stock, post_stock, put_stock, stock_alerts};
