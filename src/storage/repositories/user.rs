//! User repository: the credential store behind authentication.
//!
//! The password hash never crosses this boundary except through the two
//! authentication queries (`find_with_password`, `password_hash`); every
//! other read returns the hash-free [`User`] model.

use crate::auth::models::{NewUser, Role, User, UserStatus};
use crate::domain::UserId;
use crate::errors::{Error, Result};
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::instrument;

const USER_COLUMNS: &str = "id, email, name, role, status, two_factor_enabled, \
     two_factor_secret, password_changed_at, last_login_at, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub status: String,
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct UserAuthRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: String,
    pub status: String,
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Credential store operations used by authentication and user management.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Get a user by normalized email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Get a user together with their password hash, for login
    async fn find_with_password(&self, email: &str) -> Result<Option<(User, String)>>;

    /// Get only the stored password hash, for password-change verification
    async fn password_hash(&self, id: &UserId) -> Result<Option<String>>;

    /// The per-request authentication re-fetch: a user by id, but only when
    /// their status is `active`. Suspensions and deactivations take effect
    /// here without any token revocation infrastructure.
    async fn find_active_by_id(&self, id: &UserId) -> Result<Option<User>>;

    /// Replace the password hash and record when it changed
    async fn update_password(
        &self,
        id: &UserId,
        password_hash: String,
        changed_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Record a successful login
    async fn update_last_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<()>;

    /// Administrative status transition
    async fn update_status(&self, id: &UserId, status: UserStatus) -> Result<User>;

    /// List users with pagination
    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>>;
}

/// SQLite-backed implementation of [`UserRepository`].
#[derive(Debug, Clone)]
pub struct SqlxUserRepository {
    pool: DbPool,
}

impl SqlxUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_user(&self, row: UserRow) -> Result<User> {
        let role = Role::from_str(&row.role)
            .map_err(|_| Error::validation(format!("Unknown user role '{}'", row.role)))?;
        let status = UserStatus::from_str(&row.status)
            .map_err(|_| Error::validation(format!("Unknown user status '{}'", row.status)))?;

        Ok(User {
            id: UserId::from_string(row.id),
            email: row.email,
            name: row.name,
            role,
            status,
            two_factor_enabled: row.two_factor_enabled,
            two_factor_secret: row.two_factor_secret,
            password_changed_at: row.password_changed_at,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    fn auth_row_to_user(&self, row: UserAuthRow) -> Result<(User, String)> {
        let password_hash = row.password_hash.clone();
        let user = self.row_to_user(UserRow {
            id: row.id,
            email: row.email,
            name: row.name,
            role: row.role,
            status: row.status,
            two_factor_enabled: row.two_factor_enabled,
            two_factor_secret: row.two_factor_secret,
            password_changed_at: row.password_changed_at,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })?;
        Ok((user, password_hash))
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| Error::Database {
                source: err,
                context: "Failed to fetch user".to_string(),
            })?;

        row.map(|r| self.row_to_user(r)).transpose()
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let Some(db_err) = err.as_database_error() {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "2067" || code.as_ref().starts_with("SQLITE_CONSTRAINT");
        }
    }
    false
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    #[instrument(skip(self, user), fields(user_email = %user.email, user_id = %user.id), name = "db_create_user")]
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, role, status,
                               two_factor_enabled, two_factor_secret, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.two_factor_enabled)
        .bind(&user.two_factor_secret)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                Error::conflict("A user with this email already exists")
            } else {
                Error::Database { source: err, context: "Failed to create user".to_string() }
            }
        })?;

        self.get_user(&user.id)
            .await?
            .ok_or_else(|| Error::internal("User not found after creation"))
    }

    #[instrument(skip(self), fields(user_email = %email), name = "db_find_user_by_email")]
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| Error::Database {
                source: err,
                context: "Failed to fetch user by email".to_string(),
            })?;

        row.map(|r| self.row_to_user(r)).transpose()
    }

    #[instrument(skip(self), fields(user_email = %email), name = "db_find_user_with_password")]
    async fn find_with_password(&self, email: &str) -> Result<Option<(User, String)>> {
        let row = sqlx::query_as::<_, UserAuthRow>(
            "SELECT id, email, password_hash, name, role, status, two_factor_enabled, \
             two_factor_secret, password_changed_at, last_login_at, created_at, updated_at \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to fetch user credentials".to_string(),
        })?;

        row.map(|r| self.auth_row_to_user(r)).transpose()
    }

    #[instrument(skip(self), fields(user_id = %id), name = "db_password_hash")]
    async fn password_hash(&self, id: &UserId) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT password_hash FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|err| Error::Database {
                    source: err,
                    context: "Failed to fetch password hash".to_string(),
                })?;

        Ok(row.map(|(hash,)| hash))
    }

    #[instrument(skip(self), fields(user_id = %id), name = "db_find_active_user")]
    async fn find_active_by_id(&self, id: &UserId) -> Result<Option<User>> {
        let query =
            format!("SELECT {} FROM users WHERE id = $1 AND status = 'active'", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| Error::Database {
                source: err,
                context: "Failed to fetch active user".to_string(),
            })?;

        row.map(|r| self.row_to_user(r)).transpose()
    }

    #[instrument(skip(self, password_hash), fields(user_id = %id), name = "db_update_password")]
    async fn update_password(
        &self,
        id: &UserId,
        password_hash: String,
        changed_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, password_changed_at = $3, updated_at = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&password_hash)
        .bind(changed_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to update password".to_string(),
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("User '{}' not found", id)));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id), name = "db_update_last_login")]
    async fn update_last_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(at)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|err| Error::Database {
                source: err,
                context: "Failed to update last login".to_string(),
            })?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id, status = %status), name = "db_update_user_status")]
    async fn update_status(&self, id: &UserId, status: UserStatus) -> Result<User> {
        let result = sqlx::query("UPDATE users SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|err| Error::Database {
                source: err,
                context: "Failed to update user status".to_string(),
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("User '{}' not found", id)));
        }

        self.get_user(id).await?.ok_or_else(|| Error::internal("User not found after update"))
    }

    #[instrument(skip(self), name = "db_list_users")]
    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        let query = format!(
            "SELECT {} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            USER_COLUMNS
        );
        let rows = sqlx::query_as::<_, UserRow>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| Error::Database {
                source: err,
                context: "Failed to list users".to_string(),
            })?;

        rows.into_iter().map(|r| self.row_to_user(r)).collect()
    }
}
