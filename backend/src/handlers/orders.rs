//! HTTP handlers for order endpoints

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::orders::{LeadPatch, OrderFilter};
use crate::AppState;
use shared::RowNumber;

#[derive(Debug, Default, Deserialize)]
pub struct OrdersQuery {
    #[serde(default)]
    pub stats: bool,
    pub status: Option<String>,
    pub search: Option<String>,
}

/// Bulk status change or single-lead patch
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UpdateOrdersRequest {
    Bulk {
        orders: Vec<RowNumber>,
        status: String,
    },
    Single(LeadPatch),
}

/// List leads visible to the caller, or their statistics
pub async fn list_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<OrdersQuery>,
) -> AppResult<Response> {
    if query.stats {
        let stats = state.orders.stats(&current_user.0).await?;
        return Ok(Json(stats).into_response());
    }

    let filter = OrderFilter {
        status: query.status,
        search: query.search,
    };
    let list = state.orders.list(&current_user.0, &filter).await?;
    Ok(Json(list).into_response())
}

/// Update one lead or change the status of many
pub async fn update_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(body): Json<UpdateOrdersRequest>,
) -> AppResult<Response> {
    match body {
        UpdateOrdersRequest::Bulk { orders, status } => {
            let result = state
                .orders
                .update_bulk(&current_user.0, &orders, &status)
                .await?;
            Ok(Json(result).into_response())
        }
        UpdateOrdersRequest::Single(patch) => {
            let result = state.orders.update_single(&current_user.0, patch).await?;
            Ok(Json(result).into_response())
        }
    }
}
