//! Data models for the careportal identity system: roles, account status,
//! the authenticated principal, and the request/response DTOs of the auth
//! routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

use crate::domain::UserId;
use crate::errors::Error;

/// Role of an identity, determining which operations it may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    Doctor,
    Radiologist,
    Nurse,
    Technician,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Radiologist => "radiologist",
            Role::Nurse => "nurse",
            Role::Technician => "technician",
            Role::Patient => "patient",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "radiologist" => Ok(Role::Radiologist),
            "nurse" => Ok(Role::Nurse),
            "technician" => Ok(Role::Technician),
            "patient" => Ok(Role::Patient),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

/// Error returned when role parsing fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid role: {0}")]
pub struct RoleParseError(pub String);

/// User account status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
    PendingVerification,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Suspended => "suspended",
            UserStatus::PendingVerification => "pending-verification",
        }
    }
}

impl Display for UserStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = UserStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            "suspended" => Ok(UserStatus::Suspended),
            "pending-verification" => Ok(UserStatus::PendingVerification),
            other => Err(UserStatusParseError(other.to_string())),
        }
    }
}

/// Error returned when user status parsing fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid user status: {0}")]
pub struct UserStatusParseError(pub String);

/// Stored representation of a user account. The password hash is deliberately
/// not part of this struct: it is write-only from the API's perspective and
/// only the repository's authentication queries ever see it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub status: UserStatus,
    pub two_factor_enabled: bool,
    /// Shared secret for the second-factor verification step. Stored and
    /// carried internally, never serialized outward.
    #[serde(default, skip_serializing)]
    pub two_factor_secret: Option<String>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Check if the user is active and can authenticate.
    pub fn is_active(&self) -> bool {
        matches!(self.status, UserStatus::Active)
    }

    /// Normalize email to lowercase for consistent storage and comparison.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }
}

/// New user creation payload.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub status: UserStatus,
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
}

/// Request-scoped authentication context attached to request extensions by
/// the authentication middleware after a successful re-fetch.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub token: String,
}

impl AuthContext {
    pub fn new(user: User, token: String) -> Self {
        Self { user, token }
    }

    pub fn role(&self) -> Role {
        self.user.role
    }
}

/// Errors returned by the authentication middleware chain. The display
/// strings are the exact user-facing messages of the error envelope.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No authentication token provided")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    ExpiredToken,
    #[error("User no longer exists")]
    UserGone,
    #[error("User recently changed password. Please login again.")]
    PasswordChanged,
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("You do not have permission to perform this action")]
    PermissionDenied,
    #[error("Two-factor authentication required")]
    TwoFactorRequired,
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited { retry_after_secs: u64 },
    #[error("Authentication lookup timed out")]
    LookupTimeout,
    #[error(transparent)]
    Persistence(#[from] Error),
}

/// Request to create a new user account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<Role>,
}

/// User authentication credentials.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response after a successful login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

/// Request to change the caller's password.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Administrative request to change a user's account status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: UserStatus,
}

/// Outward representation of a user account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub status: UserStatus,
    pub two_factor_enabled: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            status: user.status,
            two_factor_enabled: user.two_factor_enabled,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}
