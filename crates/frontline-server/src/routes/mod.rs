//! HTTP route handlers, all nested under `/api`.

pub mod auth;
pub mod communities;
pub mod connections;
pub mod courses;
pub mod posts;
pub mod stats;
pub mod users;

use std::sync::Arc;

use axum::Router;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use frontline_store::Page;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(stats::routes())
        .merge(auth::routes())
        .merge(users::routes())
        .merge(posts::routes())
        .merge(courses::routes())
        .merge(communities::routes())
        .merge(connections::routes())
}

/// `?page=&page_size=` shared by list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.page_size)
    }
}
