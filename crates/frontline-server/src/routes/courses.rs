//! Course catalogue and enrollment routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;
use frontline_store::{Course, CourseFilter, CourseUpdate, NewCourse, Page, Paginated};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/courses", get(list_courses).post(create_course))
        .route("/courses/enrolled", get(my_enrollments))
        .route(
            "/courses/{id}",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/courses/{id}/enroll", post(enroll))
}

#[derive(Deserialize)]
struct ListCoursesQuery {
    instructor: Option<i64>,
    level: Option<String>,
    q: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
}

/// GET /api/courses
async fn list_courses(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListCoursesQuery>,
) -> ApiResult<Json<Paginated<Course>>> {
    let courses = state.store.list_courses(&CourseFilter {
        instructor_id: query.instructor,
        level: query.level,
        query: query.q,
        page: Page::new(query.page, query.page_size),
    })?;
    Ok(Json(courses))
}

/// POST /api/courses
async fn create_course(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(new): ApiJson<NewCourse>,
) -> ApiResult<(StatusCode, Json<Course>)> {
    let course = state.store.create_course(auth.user.id, &new)?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /api/courses/{id}
async fn get_course(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Course>> {
    state
        .store
        .get_course(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("course {id}")))
}

fn owned_course(state: &AppState, id: i64, user_id: i64) -> ApiResult<Course> {
    let course = state
        .store
        .get_course(id)?
        .ok_or_else(|| ApiError::not_found(format!("course {id}")))?;
    if course.instructor_id != user_id {
        return Err(ApiError::forbidden("only the instructor can modify this course"));
    }
    Ok(course)
}

/// PUT /api/courses/{id}
async fn update_course(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<CourseUpdate>,
) -> ApiResult<Json<Course>> {
    owned_course(&state, id, auth.user.id)?;
    state
        .store
        .update_course(id, &update)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("course {id}")))
}

/// DELETE /api/courses/{id}
async fn delete_course(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    owned_course(&state, id, auth.user.id)?;
    state.store.delete_course(id)?;
    Ok(Json(serde_json::json!({ "deleted": true, "id": id })))
}

/// POST /api/courses/{id}/enroll
async fn enroll(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<(StatusCode, Json<Course>)> {
    let course = state.store.enroll(id, auth.user.id)?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /api/courses/enrolled
async fn my_enrollments(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Course>>> {
    Ok(Json(state.store.enrollments_for_user(auth.user.id)?))
}
