//! Health and stats routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(get_stats))
}

/// GET /api/health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "frontline",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/stats: row counts across the marketplace.
async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let stats = state.store.get_stats()?;
    Ok(Json(serde_json::json!({
        "users": stats.users,
        "sellers": stats.sellers,
        "posts": stats.posts,
        "courses": stats.courses,
        "communities": stats.communities,
        "connections": stats.connections,
        "ratings": stats.ratings,
        "activeSessions": stats.active_sessions,
        "dbSizeMb": stats.db_size_mb,
    })))
}
