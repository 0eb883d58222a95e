//! Route definitions for the Lead CRM API

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes (public)
        .route("/auth/login", post(handlers::login))
        // Protected routes
        .merge(protected_routes(state))
}

/// Routes that require a session token
fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/assign", post(handlers::assign_leads))
        .route(
            "/orders",
            get(handlers::list_orders).put(handlers::update_orders),
        )
        .route(
            "/stock",
            get(handlers::list_stock)
                .post(handlers::post_stock)
                .put(handlers::put_stock),
        )
        .route("/stock/alerts", get(handlers::stock_alerts))
        .route("/stock/movements", get(handlers::list_movements))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
