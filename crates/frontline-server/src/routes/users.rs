//! Profiles, trust scores, ratings and WhatsApp contact handoff.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;
use frontline_core::contact::{greeting, whatsapp_link};
use frontline_core::validate::{normalize_phone, require_non_empty, validate_rating};
use frontline_core::{trust_score, TrustInputs};
use frontline_store::{Page, Paginated, Rating, Role, User, UserFilter, UserUpdate};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/me",
            get(get_me).put(update_me).delete(delete_me),
        )
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/trust", get(get_trust))
        .route("/users/{id}/ratings", get(list_ratings).post(rate_user))
        .route("/users/{id}/contact", get(get_contact))
}

/// Profile as seen by other users: no email or phone.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub role: Role,
    pub skills: Vec<String>,
    pub average_rating: f64,
    pub rating_count: i64,
    pub has_whatsapp: bool,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_score: Option<u32>,
}

impl From<User> for PublicProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            bio: u.bio,
            location: u.location,
            avatar_url: u.avatar_url,
            role: u.role,
            skills: u.skills,
            average_rating: u.average_rating,
            rating_count: u.rating_count,
            has_whatsapp: u.phone.is_some(),
            created_at: u.created_at,
            trust_score: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrustResponse {
    trust_score: u32,
    #[serde(flatten)]
    inputs: TrustInputs,
}

fn load_trust(state: &AppState, user_id: i64) -> ApiResult<TrustResponse> {
    let inputs = state
        .store
        .trust_inputs(user_id)?
        .ok_or_else(|| ApiError::not_found(format!("user {user_id}")))?;
    Ok(TrustResponse {
        trust_score: trust_score(inputs),
        inputs,
    })
}

#[derive(Deserialize)]
struct ListUsersQuery {
    role: Option<Role>,
    skill: Option<String>,
    location: Option<String>,
    q: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
}

/// GET /api/users
async fn list_users(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListUsersQuery>,
) -> ApiResult<Json<Paginated<PublicProfile>>> {
    let result = state.store.list_users(&UserFilter {
        role: query.role,
        skill: query.skill,
        location: query.location,
        query: query.q,
        page: Page::new(query.page, query.page_size),
    })?;

    Ok(Json(Paginated {
        items: result.items.into_iter().map(PublicProfile::from).collect(),
        total: result.total,
        page: result.page,
        page_size: result.page_size,
        total_pages: result.total_pages,
    }))
}

/// GET /api/users/me: own profile, including private fields.
async fn get_me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let trust = load_trust(&state, auth.user.id)?;
    Ok(Json(serde_json::json!({
        "user": auth.user,
        "trustScore": trust.trust_score,
    })))
}

/// PUT /api/users/me
async fn update_me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(mut update): ApiJson<UserUpdate>,
) -> ApiResult<Json<User>> {
    if let Some(name) = update.name.as_deref() {
        require_non_empty("name", name)?;
    }
    // A blank phone clears the WhatsApp number.
    update.phone = update
        .phone
        .as_deref()
        .map(|p| match p.trim() {
            "" => Ok(String::new()),
            p => normalize_phone(p),
        })
        .transpose()?;

    let user = state
        .store
        .update_user(auth.user.id, &update)?
        .ok_or_else(|| ApiError::not_found("user"))?;
    Ok(Json(user))
}

/// DELETE /api/users/me: removes the account and everything it owns.
async fn delete_me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    state.store.delete_user(auth.user.id)?;
    info!("User {} deleted their account", auth.user.id);
    Ok(Json(serde_json::json!({ "deleted": true, "id": auth.user.id })))
}

/// GET /api/users/{id}
async fn get_user(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<PublicProfile>> {
    let user = state
        .store
        .get_user(id)?
        .ok_or_else(|| ApiError::not_found(format!("user {id}")))?;
    let trust = load_trust(&state, id)?;

    let mut profile = PublicProfile::from(user);
    profile.trust_score = Some(trust.trust_score);
    Ok(Json(profile))
}

/// GET /api/users/{id}/trust
async fn get_trust(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<TrustResponse>> {
    Ok(Json(load_trust(&state, id)?))
}

#[derive(Deserialize)]
struct RateRequest {
    stars: i64,
    comment: Option<String>,
}

/// POST /api/users/{id}/ratings
async fn rate_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<RateRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let stars = validate_rating(req.stars)?;
    let target = state
        .store
        .add_rating(auth.user.id, id, stars, req.comment.as_deref())?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "userId": target.id,
            "stars": stars,
            "averageRating": target.average_rating,
            "ratingCount": target.rating_count,
        })),
    ))
}

/// GET /api/users/{id}/ratings
async fn list_ratings(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Vec<Rating>>> {
    if state.store.get_user(id)?.is_none() {
        return Err(ApiError::not_found(format!("user {id}")));
    }
    Ok(Json(state.store.ratings_for_user(id)?))
}

#[derive(Deserialize)]
struct ContactQuery {
    subject: Option<String>,
}

/// GET /api/users/{id}/contact: WhatsApp link, only between accepted connections.
async fn get_contact(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<ContactQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let target = state
        .store
        .get_user(id)?
        .ok_or_else(|| ApiError::not_found(format!("user {id}")))?;

    if target.id != auth.user.id && !state.store.are_connected(auth.user.id, target.id)? {
        return Err(ApiError::forbidden(
            "contact details are shared once a connection is accepted",
        ));
    }
    let phone = target
        .phone
        .ok_or_else(|| ApiError::not_found("user has no WhatsApp number"))?;

    let message = greeting(&auth.user.name, query.subject.as_deref());
    let url = whatsapp_link(&phone, Some(&message))?;
    Ok(Json(serde_json::json!({
        "whatsappUrl": url,
        "phone": phone,
    })))
}
