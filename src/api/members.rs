//! Member management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::member::{CreateMember, Member, UpdateMember},
};

use super::{parse_id, ApiJson, AuthenticatedUser};

/// List all members
#[utoipa::path(
    get,
    path = "/members",
    tag = "members",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All members", body = Vec<Member>),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_members(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Member>>> {
    let members = state.services.members.list_members().await?;
    Ok(Json(members))
}

/// Get member details by ID
#[utoipa::path(
    get,
    path = "/members/{id}",
    tag = "members",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member details", body = Member),
        (status = 404, description = "Member not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_member(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<Member>> {
    let member = state.services.members.get_member(parse_id(&id)?).await?;
    Ok(Json(member))
}

/// Search members by name, email or phone
#[utoipa::path(
    get,
    path = "/members/search/{query}",
    tag = "members",
    security(("bearer_auth" = [])),
    params(
        ("query" = String, Path, description = "Text to look for")
    ),
    responses(
        (status = 200, description = "Matching members", body = Vec<Member>)
    )
)]
pub async fn search_members(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(query): Path<String>,
) -> AppResult<Json<Vec<Member>>> {
    let members = state.services.members.search_members(&query).await?;
    Ok(Json(members))
}

/// Register a new member
#[utoipa::path(
    post,
    path = "/members",
    tag = "members",
    security(("bearer_auth" = [])),
    request_body = CreateMember,
    responses(
        (status = 201, description = "Member created", body = Member),
        (status = 400, description = "Invalid input or duplicate email", body = crate::error::ErrorResponse),
        (status = 403, description = "Staff only", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_member(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateMember>,
) -> AppResult<(StatusCode, Json<Member>)> {
    claims.require_staff()?;

    let member = state.services.members.create_member(request).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

/// Update a member
#[utoipa::path(
    put,
    path = "/members/{id}",
    tag = "members",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Member ID")
    ),
    request_body = UpdateMember,
    responses(
        (status = 200, description = "Member updated", body = Member),
        (status = 404, description = "Member not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_member(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateMember>,
) -> AppResult<Json<Member>> {
    claims.require_staff()?;

    let member = state
        .services
        .members
        .update_member(parse_id(&id)?, request)
        .await?;
    Ok(Json(member))
}

/// Delete a member
#[utoipa::path(
    delete,
    path = "/members/{id}",
    tag = "members",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Member ID")
    ),
    responses(
        (status = 204, description = "Member deleted"),
        (status = 400, description = "Member has active loans", body = crate::error::ErrorResponse),
        (status = 404, description = "Member not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_member(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    claims.require_staff()?;

    state.services.members.delete_member(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
