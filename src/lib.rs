//! Careportal: authentication and account management for a healthcare API.
//!
//! The crate is organized in layers:
//!
//! - [`config`] loads and validates environment-driven settings
//! - [`storage`] owns the connection pool, migrations, and repositories
//! - [`auth`] implements credentials, session tokens, and the middleware chain
//! - [`api`] wires the HTTP surface and the error envelope
//! - [`observability`] sets up structured logging and liveness reporting

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod storage;

pub use errors::{Error, Result};
