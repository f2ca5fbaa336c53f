//! Core domain types shared across the crate.

mod id;

pub use id::UserId;
