use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::db::models::AttendanceHistoryRow;
use crate::error::AppResult;
use crate::services::attendance::{self, UserAttendance, DEFAULT_HISTORY_LIMIT};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/groups/:group_id/attendance", get(summary))
        .route("/groups/:group_id/attendance/:user_id", get(history))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

async fn summary(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<i64>,
) -> AppResult<Json<Vec<UserAttendance>>> {
    Ok(Json(attendance::summary(&state, group_id).await?))
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path((group_id, user_id)): Path<(i64, i64)>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<AttendanceHistoryRow>>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(attendance::history(&state, group_id, user_id, limit).await?))
}
