//! Credential-facing operations: registration, login, and password change.

use std::sync::Arc;

use argon2::Argon2;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::auth::hashing;
use crate::auth::jwt::TokenService;
use crate::auth::models::{
    ChangePasswordRequest, LoginRequest, LoginResponse, NewUser, RegisterRequest, Role, User,
    UserStatus,
};
use crate::domain::UserId;
use crate::errors::{Error, Result};
use crate::storage::UserRepository;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Service backing the public auth routes.
#[derive(Clone)]
pub struct LoginService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    argon2: Arc<Argon2<'static>>,
    token_ttl_secs: i64,
}

impl LoginService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<TokenService>,
        token_ttl_secs: i64,
    ) -> Self {
        Self { users, tokens, argon2: Arc::new(hashing::password_hasher()), token_ttl_secs }
    }

    /// Register a new account. Accounts start in `pending-verification` and
    /// cannot authenticate until an administrator activates them.
    #[instrument(skip(self, request), fields(user_email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<User> {
        let email = User::normalize_email(&request.email);
        if !email.contains('@') {
            return Err(Error::validation("A valid email address is required"));
        }
        if request.password.len() < MIN_PASSWORD_LENGTH {
            return Err(Error::validation(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LENGTH
            )));
        }

        let role = request.role.unwrap_or(Role::Patient);
        if role == Role::Admin {
            return Err(Error::forbidden("Administrator accounts cannot be self-registered"));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(Error::conflict("A user with this email already exists"));
        }

        let password_hash = hashing::hash_password(&self.argon2, &request.password)?;
        let user = self
            .users
            .create_user(NewUser {
                id: UserId::new(),
                email,
                password_hash,
                name: request.name,
                role,
                status: UserStatus::PendingVerification,
                two_factor_enabled: false,
                two_factor_secret: None,
            })
            .await?;

        info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user)
    }

    /// Authenticate with email and password and issue a session token.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    #[instrument(skip(self, request), fields(user_email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let email = User::normalize_email(&request.email);

        let Some((user, password_hash)) = self.users.find_with_password(&email).await? else {
            warn!("Login attempt for unknown email");
            return Err(Error::unauthorized("Invalid email or password"));
        };

        if !hashing::verify_password(&self.argon2, &password_hash, &request.password)? {
            warn!(user_id = %user.id, "Login attempt with wrong password");
            return Err(Error::unauthorized("Invalid email or password"));
        }

        if !user.is_active() {
            warn!(user_id = %user.id, status = %user.status, "Login attempt on non-active account");
            return Err(Error::unauthorized("Account is not active"));
        }

        let token = self.tokens.issue(&user, self.token_ttl_secs)?;
        self.users.update_last_login(&user.id, Utc::now()).await?;

        info!(user_id = %user.id, "User logged in");
        Ok(LoginResponse { token, user: user.into() })
    }

    /// Change the caller's password. Updating `password_changed_at` is what
    /// invalidates every token issued before the change.
    #[instrument(skip(self, request), fields(user_id = %user.id))]
    pub async fn change_password(&self, user: &User, request: ChangePasswordRequest) -> Result<()> {
        let Some(current_hash) = self.users.password_hash(&user.id).await? else {
            return Err(Error::unauthorized("User no longer exists"));
        };

        if !hashing::verify_password(&self.argon2, &current_hash, &request.current_password)? {
            return Err(Error::unauthorized("Current password is incorrect"));
        }

        if request.new_password.len() < MIN_PASSWORD_LENGTH {
            return Err(Error::validation(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LENGTH
            )));
        }

        let new_hash = hashing::hash_password(&self.argon2, &request.new_password)?;
        self.users.update_password(&user.id, new_hash, Utc::now()).await?;

        info!(user_id = %user.id, "Password changed");
        Ok(())
    }
}
