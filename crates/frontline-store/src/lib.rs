//! Frontline Store: SQLite persistence for users, listings, hubs, courses and connections.

mod communities;
mod connections;
mod courses;
mod posts;
pub mod schema;
pub mod sqlite;
pub mod types;
mod users;

pub use sqlite::SqliteStore;
pub use types::*;
