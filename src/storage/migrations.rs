//! # Database Migration Management
//!
//! Schema migrations are embedded in the binary and executed on startup when
//! `auto_migrate` is enabled. Every statement is idempotent so repeated runs
//! are safe.

use crate::errors::{Error, Result};
use crate::storage::DbPool;
use tracing::info;

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id                  TEXT PRIMARY KEY,
    email               TEXT NOT NULL UNIQUE,
    password_hash       TEXT NOT NULL,
    name                TEXT NOT NULL,
    role                TEXT NOT NULL,
    status              TEXT NOT NULL,
    two_factor_enabled  INTEGER NOT NULL DEFAULT 0,
    two_factor_secret   TEXT,
    password_changed_at TEXT,
    last_login_at       TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
)
"#;

const CREATE_USERS_EMAIL_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users (email)";

const CREATE_USERS_STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_users_status ON users (status)";

/// Run all embedded migrations against the given pool
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    let statements = [
        ("create users table", CREATE_USERS_TABLE),
        ("create users email index", CREATE_USERS_EMAIL_INDEX),
        ("create users status index", CREATE_USERS_STATUS_INDEX),
    ];

    for (description, statement) in statements {
        sqlx::query(statement).execute(pool).await.map_err(|err| Error::Database {
            source: err,
            context: format!("Migration failed: {}", description),
        })?;
    }

    info!(migration_count = statements.len(), "Database migrations applied");
    Ok(())
}
