//! MediLabo Credential Store
//!
//! SQLite-backed storage for user credentials (username, password hash
//! and role), using sqlx for persistence.

pub mod error;
pub mod models;
pub mod repository;
pub mod utils;

pub use error::DbError;
pub use models::*;
pub use repository::Database;
