//! HTTP handlers for stock endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::{require_admin, CurrentUser};
use crate::services::stock::{
    AdjustInput, CreateProductInput, StockEventInput, UpdateProductInput, WriteOffKind,
};
use crate::AppState;
use shared::{StockItem, StockMovement};

const DEFAULT_MOVEMENT_LIMIT: usize = 100;
const MAX_MOVEMENT_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct MovementsQuery {
    pub product: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StockPostRequest {
    Create(CreateProductInput),
    Return(StockEventInput),
    Damage(StockEventInput),
    Loss(StockEventInput),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StockPutRequest {
    Adjust(AdjustInput),
    Update(UpdateProductInput),
}

/// List stock items
pub async fn list_stock(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<StockItem>>> {
    Ok(Json(state.stock.list_stock().await?))
}

/// Items at or below their alert threshold
pub async fn stock_alerts(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<StockItem>>> {
    Ok(Json(state.stock.low_stock().await?))
}

/// Movement log, newest first
pub async fn list_movements(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<MovementsQuery>,
) -> AppResult<Json<Vec<StockMovement>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_MOVEMENT_LIMIT)
        .clamp(1, MAX_MOVEMENT_LIMIT);
    let movements = state
        .stock
        .list_movements(query.product.as_deref(), limit)
        .await?;
    Ok(Json(movements))
}

/// Create a product or record a return, damage or loss
pub async fn post_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(body): Json<StockPostRequest>,
) -> AppResult<Response> {
    require_admin(&current_user.0)?;

    let response = match body {
        StockPostRequest::Create(input) => {
            let item = state.stock.create_product(input).await?;
            (StatusCode::CREATED, Json(item)).into_response()
        }
        StockPostRequest::Return(input) => Json(state.stock.record_return(input).await?).into_response(),
        StockPostRequest::Damage(input) => Json(
            state
                .stock
                .record_write_off(WriteOffKind::Damage, input)
                .await?,
        )
        .into_response(),
        StockPostRequest::Loss(input) => Json(
            state
                .stock
                .record_write_off(WriteOffKind::Loss, input)
                .await?,
        )
        .into_response(),
    };
    Ok(response)
}

/// Adjust a quantity or update product metadata
pub async fn put_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(body): Json<StockPutRequest>,
) -> AppResult<Response> {
    require_admin(&current_user.0)?;

    let response = match body {
        StockPutRequest::Adjust(input) => Json(state.stock.adjust(input).await?).into_response(),
        StockPutRequest::Update(input) => {
            Json(state.stock.update_product(input).await?).into_response()
        }
    };
    Ok(response)
}
