//! Authentication and authorization middleware.
//!
//! Order on protected routes is authenticate, then role gate, then two-factor
//! gate, then rate limit. Authentication always re-fetches the live account
//! (filtered to `active`) instead of trusting token claims, so suspensions
//! and deletions take effect on the very next request.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, Method},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::ApiState;
use crate::auth::jwt::TokenError;
use crate::auth::models::{AuthContext, AuthError, Role};
use crate::domain::UserId;

/// Header a client sends after completing a two-factor challenge.
pub const TWO_FACTOR_HEADER: &str = "x-2fa-verified";

/// Verify the bearer token, re-fetch the live account, and attach the
/// [`AuthContext`] to the request. CORS preflights pass through untouched.
pub async fn authenticate(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let correlation_id = Uuid::new_v4();
    let span = info_span!(
        "authenticate",
        %correlation_id,
        http.method = %request.method(),
        http.path = %request.uri().path(),
    );

    async move {
        let token = bearer_token(&request).ok_or(AuthError::MissingToken)?;

        let claims = state.tokens.verify(&token).map_err(|err| match err {
            TokenError::Expired => AuthError::ExpiredToken,
            TokenError::Invalid => AuthError::InvalidToken,
        })?;

        // The token was signed by us, so the subject is taken as-is; the
        // database lookup is what decides whether the account still exists.
        let user_id = UserId::from_string(claims.sub.clone());
        let lookup = state.users.find_active_by_id(&user_id);
        let user = match timeout(state.lookup_timeout, lookup).await {
            Err(_) => {
                warn!(user_id = %user_id, "Authentication lookup timed out");
                return Err(AuthError::LookupTimeout.into());
            }
            Ok(Err(err)) => return Err(AuthError::Persistence(err).into()),
            Ok(Ok(None)) => {
                warn!(user_id = %user_id, "Token subject has no active account");
                return Err(AuthError::UserGone.into());
            }
            Ok(Ok(Some(user))) => user,
        };

        // Whole-second comparison on both sides: a token minted before the
        // recorded password change is dead, one minted in the same second
        // survives.
        if let Some(changed_at) = user.password_changed_at {
            if claims.iat < changed_at.timestamp() {
                warn!(user_id = %user.id, "Token predates password change");
                return Err(AuthError::PasswordChanged.into());
            }
        }

        debug!(user_id = %user.id, role = %user.role, "Request authenticated");

        let mut request = request;
        request.extensions_mut().insert(AuthContext::new(user, token));
        Ok(next.run(request).await)
    }
    .instrument(span)
    .await
}

/// Reject authenticated callers whose role is not in `allowed`.
///
/// Runs after [`authenticate`]; a missing context means the route was wired
/// without it, which is treated as not authenticated rather than open access.
pub async fn require_roles(
    State(allowed): State<Arc<Vec<Role>>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(context) = request.extensions().get::<AuthContext>() else {
        return Err(AuthError::NotAuthenticated.into());
    };

    if !allowed.contains(&context.role()) {
        warn!(
            user_id = %context.user.id,
            role = %context.role(),
            "Role not permitted for this route"
        );
        return Err(AuthError::PermissionDenied.into());
    }

    Ok(next.run(request).await)
}

/// Require a completed two-factor challenge for accounts that enabled it.
/// Accounts without two-factor pass through unchanged.
pub async fn require_two_factor(request: Request, next: Next) -> Result<Response, ApiError> {
    if let Some(context) = request.extensions().get::<AuthContext>() {
        if context.user.two_factor_enabled && !two_factor_verified(&request) {
            warn!(user_id = %context.user.id, "Two-factor verification missing");
            return Err(AuthError::TwoFactorRequired.into());
        }
    }

    Ok(next.run(request).await)
}

/// Enforce the per-identity request budget. Requests without an authenticated
/// context are not counted; unauthenticated traffic is bounded by the
/// authentication gate itself.
pub async fn rate_limit(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(context) = request.extensions().get::<AuthContext>() {
        if let Err(retry_after_secs) = state.rate_limiter.check(context.user.id.as_str()).await {
            return Err(AuthError::RateLimited { retry_after_secs }.into());
        }
    }

    Ok(next.run(request).await)
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
}

fn two_factor_verified(request: &Request) -> bool {
    request
        .headers()
        .get(TWO_FACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
