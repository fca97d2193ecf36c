//! Persistence layer for bulletp state
//!
//! SQLite-backed storage for users, identities, bullets, one-time codes
//! and OAuth login states.

mod repository;
mod schema;

pub use repository::Repository;
pub use schema::{Schema, SCHEMA_VERSION};
