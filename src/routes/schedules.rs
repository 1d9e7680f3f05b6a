use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

use crate::error::AppResult;
use crate::routes::caller::CallerIdentity;
use crate::services::now_ts;
use crate::services::schedules::{self, CreateScheduleInput, ScheduleView};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/groups/:group_id/schedules",
            get(list_schedules).post(create_schedule),
        )
        .route(
            "/groups/:group_id/schedules/:schedule_id",
            delete(delete_schedule),
        )
}

async fn list_schedules(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<i64>,
) -> AppResult<Json<Vec<ScheduleView>>> {
    Ok(Json(schedules::list_schedules(&state, group_id).await?))
}

async fn create_schedule(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<i64>,
    CallerIdentity(caller): CallerIdentity,
    Json(request): Json<CreateScheduleInput>,
) -> AppResult<(StatusCode, Json<ScheduleView>)> {
    let view = schedules::create_schedule(&state, group_id, &caller, &request, now_ts()).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    Path((group_id, schedule_id)): Path<(i64, i64)>,
    CallerIdentity(caller): CallerIdentity,
) -> AppResult<StatusCode> {
    schedules::delete_schedule(&state, group_id, &caller, schedule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
