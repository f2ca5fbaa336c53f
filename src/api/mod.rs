//! HTTP API: shared state, routing, handlers, and the error envelope.

pub mod docs;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{LoginService, RateLimiter, TokenService};
use crate::config::AppConfig;
use crate::storage::{DbPool, SqlxUserRepository, UserRepository};

/// Shared state handed to every route and middleware layer.
#[derive(Clone)]
pub struct ApiState {
    pub users: Arc<dyn UserRepository>,
    pub tokens: Arc<TokenService>,
    pub login: LoginService,
    pub rate_limiter: RateLimiter,
    /// Budget for the per-request credential re-fetch.
    pub lookup_timeout: Duration,
    /// Whether internal error details are included in responses. Off in
    /// production.
    pub expose_error_details: bool,
}

impl ApiState {
    pub fn new(config: &AppConfig, pool: DbPool) -> Self {
        let users: Arc<dyn UserRepository> = Arc::new(SqlxUserRepository::new(pool));
        let tokens = Arc::new(TokenService::new(config.auth.jwt_secret.as_bytes()));
        let login = LoginService::new(users.clone(), tokens.clone(), config.auth.token_ttl_secs);
        let rate_limiter = RateLimiter::new(
            config.auth.rate_limit_max_requests,
            Duration::from_secs(config.auth.rate_limit_window_secs),
        );

        Self {
            users,
            tokens,
            login,
            rate_limiter,
            lookup_timeout: Duration::from_secs(config.auth.lookup_timeout_secs),
            expose_error_details: !config.environment.is_production(),
        }
    }
}
