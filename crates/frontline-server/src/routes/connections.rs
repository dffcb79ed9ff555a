//! Connection request routes. Accepting a request unlocks the WhatsApp handoff.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;
use frontline_store::{Connection, ConnectionStatus};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/connections", get(list_connections).post(create_connection))
        .route("/connections/{id}", delete(delete_connection))
        .route("/connections/{id}/accept", post(accept))
        .route("/connections/{id}/decline", post(decline))
}

#[derive(Deserialize)]
struct ListConnectionsQuery {
    status: Option<ConnectionStatus>,
}

/// GET /api/connections
async fn list_connections(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<ListConnectionsQuery>,
) -> ApiResult<Json<Vec<Connection>>> {
    Ok(Json(
        state.store.list_connections(auth.user.id, query.status)?,
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest {
    recipient_id: i64,
    message: Option<String>,
}

/// POST /api/connections
async fn create_connection(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<ConnectRequest>,
) -> ApiResult<(StatusCode, Json<Connection>)> {
    let connection =
        state
            .store
            .create_connection(auth.user.id, req.recipient_id, req.message.as_deref())?;
    Ok((StatusCode::CREATED, Json(connection)))
}

/// POST /api/connections/{id}/accept
async fn accept(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Connection>> {
    Ok(Json(state.store.respond_connection(id, auth.user.id, true)?))
}

/// POST /api/connections/{id}/decline
async fn decline(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Connection>> {
    Ok(Json(state.store.respond_connection(id, auth.user.id, false)?))
}

/// DELETE /api/connections/{id}: either party may remove it.
async fn delete_connection(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let connection = state
        .store
        .get_connection(id)?
        .ok_or_else(|| ApiError::not_found(format!("connection {id}")))?;
    if !connection.involves(auth.user.id) {
        return Err(ApiError::forbidden("not part of this connection"));
    }
    state.store.delete_connection(id)?;
    Ok(Json(serde_json::json!({ "deleted": true, "id": id })))
}
