//! # Configuration Settings
//!
//! Defines the configuration structure for the careportal service. All values
//! are sourced from `CAREPORTAL_*` environment variables with sensible
//! defaults for development; the JWT signing secret has no default and its
//! absence is a fatal startup condition.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}

/// Deployment environment, controlling error-detail exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Read the environment from `CAREPORTAL_ENV` (defaults to development)
    pub fn from_env() -> Self {
        match std::env::var("CAREPORTAL_ENV").unwrap_or_default().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// HTTP server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Authentication configuration
    #[validate(nested)]
    pub auth: AuthConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// Deployment environment
    pub environment: Environment,
}

impl AppConfig {
    /// Load the full configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let config = Self {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            auth: AuthConfig::from_env()?,
            observability: ObservabilityConfig::from_env(),
            environment: Environment::from_env(),
        };
        config.validate_all()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate_all(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    /// Custom validation logic that goes beyond what the validator crate can do
    fn validate_custom(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite://") {
            return Err(Error::validation("Database URL must start with 'sqlite://'"));
        }

        if self.auth.jwt_secret.len() < 32 {
            return Err(Error::validation("JWT secret must be at least 32 characters long"));
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("CAREPORTAL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parsed("CAREPORTAL_PORT", 8080),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8080 }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of pooled connections
    #[validate(range(min = 1, message = "max_connections must be greater than 0"))]
    pub max_connections: u32,

    /// Minimum number of pooled connections
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub connect_timeout_seconds: u64,

    /// Idle connection timeout in seconds (0 disables the timeout)
    pub idle_timeout_seconds: u64,

    /// Run embedded migrations automatically on startup
    pub auto_migrate: bool,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("CAREPORTAL_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./careportal.db".to_string()),
            max_connections: env_parsed("CAREPORTAL_DATABASE_MAX_CONNECTIONS", 10),
            min_connections: env_parsed("CAREPORTAL_DATABASE_MIN_CONNECTIONS", 1),
            connect_timeout_seconds: env_parsed("CAREPORTAL_DATABASE_CONNECT_TIMEOUT", 30),
            idle_timeout_seconds: env_parsed("CAREPORTAL_DATABASE_IDLE_TIMEOUT", 600),
            auto_migrate: env_parsed("CAREPORTAL_DATABASE_AUTO_MIGRATE", true),
        }
    }

    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite://")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_seconds > 0).then(|| Duration::from_secs(self.idle_timeout_seconds))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./careportal.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_seconds: 30,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AuthConfig {
    /// Secret used to sign and verify session tokens. Required; never logged.
    #[serde(skip_serializing)]
    pub jwt_secret: String,

    /// Session token lifetime in seconds
    #[validate(range(min = 60, message = "Token TTL must be at least 60 seconds"))]
    pub token_ttl_secs: i64,

    /// Timeout for the per-request credential re-fetch, in seconds
    #[validate(range(min = 1, max = 60, message = "Lookup timeout must be between 1 and 60 seconds"))]
    pub lookup_timeout_secs: u64,

    /// Maximum requests per identity within one rate-limit window
    #[validate(range(min = 1, message = "Rate limit must allow at least one request"))]
    pub rate_limit_max_requests: u32,

    /// Rate-limit window length in seconds
    #[validate(range(min = 1, message = "Rate limit window must be at least one second"))]
    pub rate_limit_window_secs: u64,
}

impl AuthConfig {
    /// Load authentication settings. A missing `CAREPORTAL_JWT_SECRET` is a
    /// fatal configuration error.
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("CAREPORTAL_JWT_SECRET").map_err(|_| {
            Error::config("CAREPORTAL_JWT_SECRET must be set; refusing to start without it")
        })?;

        Ok(Self {
            jwt_secret,
            token_ttl_secs: env_parsed("CAREPORTAL_TOKEN_TTL_SECS", 3600),
            lookup_timeout_secs: env_parsed("CAREPORTAL_AUTH_LOOKUP_TIMEOUT_SECS", 5),
            rate_limit_max_requests: env_parsed("CAREPORTAL_RATE_LIMIT_MAX_REQUESTS", 100),
            rate_limit_window_secs: env_parsed("CAREPORTAL_RATE_LIMIT_WINDOW_SECS", 60),
        })
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: 3600,
            lookup_timeout_secs: 5,
            rate_limit_max_requests: 100,
            rate_limit_window_secs: 60,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Default log filter when RUST_LOG is not set
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit logs as JSON instead of human-readable text
    pub json_logs: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self {
            log_level: std::env::var("CAREPORTAL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            json_logs: env_parsed("CAREPORTAL_LOG_JSON", false),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logs: false }
    }
}
