//! Lead CRM backend
//!
//! Leads and inventory live in a spreadsheet. This crate assigns leads to
//! employees, keeps the stock ledger consistent with shipped orders and
//! serves both over HTTP.

use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;

pub use config::Config;

use config::LedgerBackend;
use error::AppResult;
use external::{GoogleSheetsClient, LedgerStore, MemoryLedger};
use middleware::{rate_limit_middleware, RateLimiter};
use services::{
    AssignmentGate, AssignmentService, AuthService, OrderService, SheetLedger,
    ShippingCoordinator, StockService,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: SheetLedger,
    pub auth: AuthService,
    pub stock: StockService,
    pub assignment: AssignmentService,
    pub shipping: ShippingCoordinator,
    pub orders: OrderService,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Wire every service over one ledger store
    pub fn new(config: Config, store: Arc<dyn LedgerStore>) -> Self {
        let ledger = SheetLedger::new(store, &config.sheets);
        let gate = AssignmentGate::new(Duration::from_secs(config.assignment.cooldown_secs));

        let stock = StockService::new(ledger.clone());
        let assignment = AssignmentService::new(ledger.clone(), &config, gate);
        let shipping = ShippingCoordinator::new(ledger.clone(), stock.clone());
        let orders = OrderService::new(ledger.clone(), assignment.clone(), shipping.clone());

        Self {
            auth: AuthService::new(&config),
            rate_limiter: RateLimiter::new(&config.rate_limit),
            config: Arc::new(config),
            ledger,
            stock,
            assignment,
            shipping,
            orders,
        }
    }

    /// Build the configured ledger store and wire the services over it
    pub fn from_config(config: Config) -> AppResult<Self> {
        let store: Arc<dyn LedgerStore> = match config.sheets.backend {
            LedgerBackend::Google => Arc::new(GoogleSheetsClient::new(&config.sheets)?),
            LedgerBackend::Memory => {
                tracing::warn!("Using the in-memory ledger; data is lost on restart");
                Arc::new(empty_memory_ledger(&config))
            }
        };
        Ok(Self::new(config, store))
    }
}

/// In-memory ledger with header rows in place
fn empty_memory_ledger(config: &Config) -> MemoryLedger {
    let sheets = &config.sheets;
    MemoryLedger::new()
        .with_sheet(
            &sheets.leads_sheet,
            vec![vec![
                "Order Date",
                "Customer Name",
                "Phone",
                "WhatsApp",
                "Governorate",
                "Area",
                "Address",
                "Product",
                "Quantity",
                "Total Price",
                "Status",
                "Notes",
                "Source",
                "Assignee",
            ]],
        )
        .with_sheet(
            &sheets.stock_sheet,
            vec![vec![
                "Product Name",
                "Initial Quantity",
                "Current Quantity",
                "Last Update",
                "Synonyms",
                "Min Threshold",
            ]],
        )
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Lead CRM API v1"
}
