//! OpenAPI document for the HTTP surface, served at `/api-docs/openapi.json`.

use axum::Json;
use utoipa::OpenApi;

use crate::api::handlers;
use crate::auth::models::{
    ChangePasswordRequest, LoginRequest, LoginResponse, RegisterRequest, Role,
    UpdateStatusRequest, UserResponse, UserStatus,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Careportal API",
        description = "Authentication and account management for the careportal service"
    ),
    paths(
        handlers::register,
        handlers::login,
        handlers::me,
        handlers::change_password,
        handlers::list_users,
        handlers::update_user_status,
    ),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        LoginResponse,
        ChangePasswordRequest,
        UpdateStatusRequest,
        UserResponse,
        Role,
        UserStatus,
    )),
    tags(
        (name = "auth", description = "Registration, login, and session management"),
        (name = "users", description = "Administrative account management")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
