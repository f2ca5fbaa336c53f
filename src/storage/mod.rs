//! Persistence layer: connection pooling, schema migrations, and the
//! credential store repositories.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, DbPool};
pub use repositories::{SqlxUserRepository, UserRepository};
