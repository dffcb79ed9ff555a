//! Registration, login and logout.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use crate::auth::{hash_password, issue_session, verify_password, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::state::AppState;
use frontline_core::validate::{normalize_phone, require_non_empty, validate_email, validate_password};
use frontline_store::{NewUser, Role, User};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

#[derive(Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
    phone: Option<String>,
    #[serde(default)]
    role: Role,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

fn session_body(token: String, expires_at: i64, user: &User) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "token": token,
        "expiresAt": expires_at,
        "user": user,
    }))
}

/// POST /api/auth/register
async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let name = require_non_empty("name", &req.name)?.to_string();
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;
    let phone = req
        .phone
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(normalize_phone)
        .transpose()?;

    let user = state.store.create_user(NewUser {
        name,
        email,
        password_hash: hash_password(&req.password)?,
        phone,
        role: req.role,
    })?;
    let (token, expires_at) = issue_session(&state, user.id)?;
    info!("Registered user {} as {}", user.id, user.role);

    Ok((StatusCode::CREATED, session_body(token, expires_at, &user)))
}

/// POST /api/auth/login
async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let invalid = || ApiError::unauthorized("invalid email or password");
    let email = validate_email(&req.email).map_err(|_| invalid())?;

    let creds = state
        .store
        .credentials_by_email(&email)?
        .ok_or_else(invalid)?;
    if !verify_password(&req.password, &creds.password_hash) {
        return Err(invalid());
    }

    let user = state
        .store
        .get_user(creds.user_id)?
        .ok_or_else(invalid)?;
    let (token, expires_at) = issue_session(&state, user.id)?;
    Ok(session_body(token, expires_at, &user))
}

/// POST /api/auth/logout: revoke the presented token.
async fn logout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    state.store.delete_session(&auth.token_hash)?;
    Ok(Json(serde_json::json!({ "success": true })))
}
