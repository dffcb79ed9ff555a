//! Frontline server: REST API for the marketplace frontend.

pub mod auth;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
