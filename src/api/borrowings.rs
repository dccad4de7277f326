//! Borrowing endpoints: issue, return and ledger views

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::borrowing::{
        Borrowing, BorrowingDetails, BorrowingQuery, BorrowingStats, IssueBorrowing,
    },
};

use super::{parse_id, ApiJson, AuthenticatedUser};

/// List borrowings, optionally filtered
#[utoipa::path(
    get,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(BorrowingQuery),
    responses(
        (status = 200, description = "Matching borrowings", body = Vec<BorrowingDetails>),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_borrowings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<BorrowingQuery>,
) -> AppResult<Json<Vec<BorrowingDetails>>> {
    let borrowings = state.services.borrowings.list(&query).await?;
    Ok(Json(borrowings))
}

/// Get a borrowing by ID
#[utoipa::path(
    get,
    path = "/borrowings/{id}",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Borrowing details", body = BorrowingDetails),
        (status = 404, description = "Borrowing not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_borrowing(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<BorrowingDetails>> {
    let borrowing = state.services.borrowings.get(parse_id(&id)?).await?;
    Ok(Json(borrowing))
}

/// Borrowing history of a member
#[utoipa::path(
    get,
    path = "/members/{id}/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member's borrowings", body = Vec<BorrowingDetails>),
        (status = 404, description = "Member not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn member_borrowings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<BorrowingDetails>>> {
    let borrowings = state
        .services
        .borrowings
        .member_history(parse_id(&id)?)
        .await?;
    Ok(Json(borrowings))
}

/// Active borrowings past their due date
#[utoipa::path(
    get,
    path = "/borrowings/overdue",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue borrowings", body = Vec<BorrowingDetails>)
    )
)]
pub async fn overdue_borrowings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowingDetails>>> {
    let borrowings = state.services.borrowings.list_overdue().await?;
    Ok(Json(borrowings))
}

/// Ledger statistics
#[utoipa::path(
    get,
    path = "/borrowings/stats",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Borrowing statistics", body = BorrowingStats),
        (status = 403, description = "Staff only", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrowing_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<BorrowingStats>> {
    claims.require_staff()?;

    let stats = state.services.borrowings.stats().await?;
    Ok(Json(stats))
}

/// Issue a book to a member
#[utoipa::path(
    post,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    request_body = IssueBorrowing,
    responses(
        (status = 201, description = "Book issued", body = Borrowing),
        (status = 400, description = "Book unavailable, limit reached or invalid input", body = crate::error::ErrorResponse),
        (status = 404, description = "Book or member not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn issue_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<IssueBorrowing>,
) -> AppResult<(StatusCode, Json<Borrowing>)> {
    claims.require_staff()?;

    let borrowing = state.services.borrowings.issue_book(request).await?;
    Ok((StatusCode::CREATED, Json(borrowing)))
}

/// Return a borrowed book
#[utoipa::path(
    put,
    path = "/borrowings/{id}/return",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = Borrowing),
        (status = 400, description = "Already returned", body = crate::error::ErrorResponse),
        (status = 404, description = "Borrowing not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<Borrowing>> {
    claims.require_staff()?;

    let borrowing = state.services.borrowings.return_book(parse_id(&id)?).await?;
    Ok(Json(borrowing))
}
