//! Logging setup and liveness reporting.

pub mod health;
pub mod logging;

pub use logging::init_logging;
