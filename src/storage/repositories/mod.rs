//! Repository implementations over the database pool.

mod user;

pub use user::{SqlxUserRepository, UserRepository};
