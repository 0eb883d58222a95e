//! Lead assignment handlers

use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::middleware::{require_admin, CurrentUser};
use crate::services::assignment::AssignmentReport;
use crate::AppState;

/// Run an assignment pass now, ignoring the cooldown
pub async fn assign_leads(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<AssignmentReport>> {
    require_admin(&current_user.0)?;
    tracing::info!(username = %current_user.0.username, "Manual assignment requested");
    let report = state.assignment.manual_assign().await?;
    Ok(Json(report))
}
