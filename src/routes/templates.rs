use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};

use crate::error::AppResult;
use crate::routes::caller::CallerIdentity;
use crate::services::now_ts;
use crate::services::render::RosterSnapshot;
use crate::services::templates::{
    self, TemplateInput, TemplateUpdate, TemplateView, UseTemplateInput,
};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/groups/:group_id/templates",
            get(list_templates).post(save_template),
        )
        .route(
            "/groups/:group_id/templates/:name",
            put(update_template).delete(delete_template),
        )
        .route("/groups/:group_id/templates/:name/use", post(use_template))
}

async fn list_templates(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<i64>,
) -> AppResult<Json<Vec<TemplateView>>> {
    Ok(Json(templates::list_templates(&state, group_id).await?))
}

/// Create or overwrite a template
async fn save_template(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<i64>,
    CallerIdentity(caller): CallerIdentity,
    Json(request): Json<TemplateInput>,
) -> AppResult<Json<TemplateView>> {
    let saved = templates::save_template(&state, group_id, &caller, &request, now_ts()).await?;
    Ok(Json(saved))
}

async fn update_template(
    State(state): State<Arc<AppState>>,
    Path((group_id, name)): Path<(i64, String)>,
    CallerIdentity(caller): CallerIdentity,
    Json(request): Json<TemplateUpdate>,
) -> AppResult<Json<TemplateView>> {
    tracing::debug!("User {} updating template '{}'", caller.user_id, name);
    let saved = templates::update_template(&state, group_id, &name, &request, now_ts()).await?;
    Ok(Json(saved))
}

async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path((group_id, name)): Path<(i64, String)>,
    CallerIdentity(caller): CallerIdentity,
) -> AppResult<StatusCode> {
    tracing::debug!("User {} deleting template '{}'", caller.user_id, name);
    templates::delete_template(&state, group_id, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn use_template(
    State(state): State<Arc<AppState>>,
    Path((group_id, name)): Path<(i64, String)>,
    CallerIdentity(caller): CallerIdentity,
    Json(request): Json<UseTemplateInput>,
) -> AppResult<(StatusCode, Json<RosterSnapshot>)> {
    let snapshot =
        templates::use_template(&state, group_id, &caller, &name, &request, now_ts()).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}
