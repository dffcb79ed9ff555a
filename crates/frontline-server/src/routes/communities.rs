//! Community hub routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::PageQuery;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;
use frontline_store::{
    Community, CommunityFilter, Member, NewCommunity, Page, Paginated, Post, PostFilter,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/communities", get(list_communities).post(create_community))
        .route(
            "/communities/{id}",
            get(get_community).delete(delete_community),
        )
        .route("/communities/{id}/join", post(join))
        .route("/communities/{id}/leave", post(leave))
        .route("/communities/{id}/members", get(members))
        .route("/communities/{id}/posts", get(community_posts))
}

#[derive(Deserialize)]
struct ListCommunitiesQuery {
    category: Option<String>,
    q: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
}

fn require_community(state: &AppState, id: i64) -> ApiResult<Community> {
    state
        .store
        .get_community(id)?
        .ok_or_else(|| ApiError::not_found(format!("community {id}")))
}

/// GET /api/communities: biggest hubs first.
async fn list_communities(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListCommunitiesQuery>,
) -> ApiResult<Json<Paginated<Community>>> {
    let communities = state.store.list_communities(&CommunityFilter {
        category: query.category,
        query: query.q,
        page: Page::new(query.page, query.page_size),
    })?;
    Ok(Json(communities))
}

/// POST /api/communities
async fn create_community(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(new): ApiJson<NewCommunity>,
) -> ApiResult<(StatusCode, Json<Community>)> {
    let community = state.store.create_community(auth.user.id, &new)?;
    Ok((StatusCode::CREATED, Json(community)))
}

/// GET /api/communities/{id}
async fn get_community(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Community>> {
    Ok(Json(require_community(&state, id)?))
}

/// DELETE /api/communities/{id}: creator only.
async fn delete_community(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let community = require_community(&state, id)?;
    if community.creator_id != auth.user.id {
        return Err(ApiError::forbidden("only the creator can delete this community"));
    }
    state.store.delete_community(id)?;
    Ok(Json(serde_json::json!({ "deleted": true, "id": id })))
}

/// POST /api/communities/{id}/join
async fn join(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Community>> {
    state.store.join_community(id, auth.user.id)?;
    Ok(Json(require_community(&state, id)?))
}

/// POST /api/communities/{id}/leave
async fn leave(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Community>> {
    let community = require_community(&state, id)?;
    if community.creator_id == auth.user.id {
        return Err(ApiError::forbidden(
            "the creator cannot leave; delete the community instead",
        ));
    }
    if !state.store.leave_community(id, auth.user.id)? {
        return Err(ApiError::not_found("not a member of this community"));
    }
    Ok(Json(require_community(&state, id)?))
}

/// GET /api/communities/{id}/members
async fn members(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Vec<Member>>> {
    require_community(&state, id)?;
    Ok(Json(state.store.community_members(id)?))
}

/// GET /api/communities/{id}/posts
async fn community_posts(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<Paginated<Post>>> {
    require_community(&state, id)?;
    let posts = state.store.list_posts(&PostFilter {
        community_id: Some(id),
        page: query.page(),
        ..Default::default()
    })?;
    Ok(Json(posts))
}
