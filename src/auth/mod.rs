//! Authentication and authorization: credential hashing, session tokens, the
//! middleware chain, rate limiting, and the login/registration service.

pub mod hashing;
pub mod jwt;
pub mod login_service;
pub mod middleware;
pub mod models;
pub mod rate_limit;

pub use jwt::{Claims, TokenError, TokenService};
pub use login_service::LoginService;
pub use models::{AuthContext, AuthError, Role, User, UserStatus};
pub use rate_limit::RateLimiter;
