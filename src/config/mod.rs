//! Configuration loading and validation for the careportal service.

mod settings;

pub use settings::{
    AppConfig, AuthConfig, DatabaseConfig, Environment, ObservabilityConfig, ServerConfig,
};
