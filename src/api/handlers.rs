//! Route handlers for the auth and user-management endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::api::error::ApiError;
use crate::api::ApiState;
use crate::auth::models::{
    AuthContext, ChangePasswordRequest, LoginRequest, LoginResponse, RegisterRequest,
    UpdateStatusRequest, UserResponse,
};
use crate::domain::UserId;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

/// Create a new account. Accounts start unverified and must be activated by
/// an administrator before they can log in.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid email, password, or role"),
        (status = 409, description = "Email already registered")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<ApiState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state.login.register(request).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Exchange email and password for a session token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 401, description = "Bad credentials or non-active account")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<ApiState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let response = state.login.login(request).await?;
    Ok(Json(response))
}

/// Return the authenticated caller's own account.
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current account", body = UserResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "auth"
)]
pub async fn me(Extension(context): Extension<AuthContext>) -> Json<UserResponse> {
    Json(context.user.into())
}

/// Change the caller's password, invalidating tokens issued before the change.
#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "New password too weak"),
        (status = 401, description = "Current password incorrect")
    ),
    tag = "auth"
)]
pub async fn change_password(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    state.login.change_password(&context.user, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    /// Page size, capped at 100
    pub limit: Option<i64>,
    /// Number of records to skip
    pub offset: Option<i64>,
}

/// List user accounts, newest first. Administrators only.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Page of accounts", body = [UserResponse]),
        (status = 403, description = "Caller is not an administrator")
    ),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<ApiState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let users = state.users.list_users(limit, offset).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Transition an account's status. Administrators only; activation is how a
/// newly registered account becomes usable.
#[utoipa::path(
    put,
    path = "/api/v1/users/{id}/status",
    params(("id" = String, Path, description = "User identifier")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Updated account", body = UserResponse),
        (status = 404, description = "No such user")
    ),
    tag = "users"
)]
pub async fn update_user_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let id = UserId::parse(&id)
        .map_err(|_| ApiError::validation(format!("'{}' is not a valid user id", id)))?;

    let user = state.users.update_status(&id, request.status).await?;
    Ok(Json(user.into()))
}
