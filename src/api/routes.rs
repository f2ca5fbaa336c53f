//! Router assembly and middleware wiring.
//!
//! Layer order matters: the error envelope is outermost so every failure is
//! serialized exactly once, authentication wraps all protected routes, and
//! the role, two-factor, and rate-limit gates run inside it in that order.

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::{docs, error, handlers, ApiState};
use crate::auth::middleware::{authenticate, rate_limit, require_roles, require_two_factor};
use crate::auth::models::Role;
use crate::observability::health;

pub fn build_router(state: ApiState) -> Router {
    let admin_roles: Arc<Vec<Role>> = Arc::new(vec![Role::Admin]);

    let admin = Router::new()
        .route("/api/v1/users", get(handlers::list_users))
        .route("/api/v1/users/{id}/status", put(handlers::update_user_status))
        .route_layer(from_fn_with_state(state.clone(), rate_limit))
        .route_layer(from_fn(require_two_factor))
        .route_layer(from_fn_with_state(admin_roles, require_roles));

    let account = Router::new()
        .route("/api/v1/auth/me", get(handlers::me))
        .route("/api/v1/auth/change-password", post(handlers::change_password))
        .route_layer(from_fn_with_state(state.clone(), rate_limit))
        .route_layer(from_fn(require_two_factor));

    let protected =
        admin.merge(account).layer(from_fn_with_state(state.clone(), authenticate));

    let public = Router::new()
        .route("/api/v1/auth/register", post(handlers::register))
        .route("/api/v1/auth/login", post(handlers::login))
        .route("/health", get(health::health))
        .route("/api-docs/openapi.json", get(docs::openapi_json));

    protected
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(from_fn_with_state(state.clone(), error::error_envelope))
        .with_state(state)
}
