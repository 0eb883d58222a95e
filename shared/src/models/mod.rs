//! Domain models for the Lead CRM

mod lead;
mod stock;

pub use lead::*;
pub use stock::*;
