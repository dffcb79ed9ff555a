//! Marketplace listing routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;
use frontline_store::{NewPost, Page, Paginated, Post, PostFilter, PostUpdate};

const DEFAULT_SEARCH_LIMIT: usize = 20;
const MAX_SEARCH_LIMIT: usize = 100;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/search", get(search_posts))
        .route(
            "/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
}

#[derive(Deserialize)]
struct ListPostsQuery {
    author: Option<i64>,
    community: Option<i64>,
    category: Option<String>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    page: Option<usize>,
    page_size: Option<usize>,
}

/// GET /api/posts: newest-first feed.
async fn list_posts(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListPostsQuery>,
) -> ApiResult<Json<Paginated<Post>>> {
    let posts = state.store.list_posts(&PostFilter {
        author_id: query.author,
        community_id: query.community,
        category: query.category,
        min_price: query.min_price,
        max_price: query.max_price,
        page: Page::new(query.page, query.page_size),
    })?;
    Ok(Json(posts))
}

/// POST /api/posts
async fn create_post(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(new): ApiJson<NewPost>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let post = state.store.create_post(auth.user.id, &new)?;
    Ok((StatusCode::CREATED, Json(post)))
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

/// GET /api/posts/search?q=
async fn search_posts(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let results = state.store.search_posts(&query.q, limit)?;
    Ok(Json(serde_json::json!({
        "query": query.q,
        "total": results.len(),
        "results": results,
    })))
}

/// GET /api/posts/{id}
async fn get_post(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Post>> {
    state
        .store
        .get_post(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("post {id}")))
}

fn owned_post(state: &AppState, id: i64, user_id: i64) -> ApiResult<Post> {
    let post = state
        .store
        .get_post(id)?
        .ok_or_else(|| ApiError::not_found(format!("post {id}")))?;
    if post.author_id != user_id {
        return Err(ApiError::forbidden("only the author can modify this post"));
    }
    Ok(post)
}

/// PUT /api/posts/{id}
async fn update_post(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<PostUpdate>,
) -> ApiResult<Json<Post>> {
    owned_post(&state, id, auth.user.id)?;
    state
        .store
        .update_post(id, &update)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("post {id}")))
}

/// DELETE /api/posts/{id}
async fn delete_post(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    owned_post(&state, id, auth.user.id)?;
    state.store.delete_post(id)?;
    Ok(Json(serde_json::json!({ "deleted": true, "id": id })))
}
