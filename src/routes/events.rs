use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::db::models::Event;
use crate::error::AppResult;
use crate::routes::caller::CallerIdentity;
use crate::services::events::{
    self, CloneEventInput, CreateEventInput, EditEventInput, EditReport, DEFAULT_LIST_LIMIT,
};
use crate::services::render::RosterSnapshot;
use crate::services::signup::{self, SignupResult};
use crate::services::now_ts;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/groups/:group_id/events",
            get(list_upcoming).post(create_event),
        )
        .route(
            "/events/:event_id",
            get(view_event).patch(edit_event).delete(delete_event),
        )
        .route("/events/:event_id/clone", post(clone_event))
        .route("/events/:event_id/signup", post(request_role))
        .route("/events/:event_id/leave", post(leave))
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub role: String,
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_event(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<i64>,
    CallerIdentity(caller): CallerIdentity,
    Json(request): Json<CreateEventInput>,
) -> AppResult<(StatusCode, Json<RosterSnapshot>)> {
    let snapshot = events::create_event(&state, group_id, &caller, &request, now_ts()).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn list_upcoming(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Event>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let events = events::list_upcoming(&state, group_id, now_ts(), limit).await?;
    Ok(Json(events))
}

async fn view_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
) -> AppResult<Json<RosterSnapshot>> {
    Ok(Json(events::roster_snapshot(&state, event_id).await?))
}

async fn edit_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
    CallerIdentity(caller): CallerIdentity,
    Json(request): Json<EditEventInput>,
) -> AppResult<Json<EditReport>> {
    let report = events::edit_event(&state, &caller, event_id, &request, now_ts()).await?;
    Ok(Json(report))
}

async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
    CallerIdentity(caller): CallerIdentity,
) -> AppResult<StatusCode> {
    events::delete_event(&state, &caller, event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clone_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
    CallerIdentity(caller): CallerIdentity,
    Json(request): Json<CloneEventInput>,
) -> AppResult<(StatusCode, Json<RosterSnapshot>)> {
    let snapshot = events::clone_event(&state, &caller, event_id, &request, now_ts()).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn request_role(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
    CallerIdentity(caller): CallerIdentity,
    Json(request): Json<SignupRequest>,
) -> AppResult<Json<SignupResult>> {
    let result =
        signup::request_role(&state, event_id, caller.user_id, &request.role, now_ts()).await?;
    Ok(Json(result))
}

async fn leave(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
    CallerIdentity(caller): CallerIdentity,
) -> AppResult<Json<SignupResult>> {
    let result = signup::leave(&state, event_id, caller.user_id, now_ts()).await?;
    Ok(Json(result))
}
