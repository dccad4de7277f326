//! Dashboard endpoint

use axum::{extract::State, Json};

use crate::{error::AppResult, models::dashboard::DashboardStats};

use super::AuthenticatedUser;

/// Catalog and membership overview
#[utoipa::path(
    get,
    path = "/dashboard/stats",
    tag = "dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard statistics", body = DashboardStats),
        (status = 403, description = "Staff only", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<DashboardStats>> {
    claims.require_staff()?;

    let stats = state.services.dashboard.stats().await?;
    Ok(Json(stats))
}
