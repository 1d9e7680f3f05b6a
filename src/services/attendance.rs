//! Attendance reports built from the append-only attendance log.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::models::{AttendanceCount, AttendanceHistoryRow};
use crate::db::AttendanceRepository;
use crate::error::AppResult;
use crate::AppState;

pub const DEFAULT_HISTORY_LIMIT: i64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleAttendance {
    pub role: String,
    pub count: i64,
}

/// Events a user ended up on the main roster for, by role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAttendance {
    pub user_id: i64,
    pub total: i64,
    pub roles: Vec<RoleAttendance>,
}

/// Group per user, most-used roles first; users with the most events first.
pub fn summarize(counts: Vec<AttendanceCount>) -> Vec<UserAttendance> {
    let mut per_user: BTreeMap<i64, Vec<RoleAttendance>> = BTreeMap::new();
    for row in counts {
        per_user.entry(row.user_id).or_default().push(RoleAttendance {
            role: row.role_name,
            count: row.attended,
        });
    }

    let mut summary: Vec<UserAttendance> = per_user
        .into_iter()
        .map(|(user_id, mut roles)| {
            roles.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.role.cmp(&b.role)));
            UserAttendance {
                user_id,
                total: roles.iter().map(|r| r.count).sum(),
                roles,
            }
        })
        .collect();
    summary.sort_by(|a, b| b.total.cmp(&a.total).then(a.user_id.cmp(&b.user_id)));
    summary
}

/// Only each (event, user)'s latest record counts, and only if it is `main`.
pub async fn summary(state: &AppState, group_id: i64) -> AppResult<Vec<UserAttendance>> {
    let mut conn = state.store.acquire().await?;
    let counts = AttendanceRepository::count_attended(&mut conn, group_id).await?;
    Ok(summarize(counts))
}

pub async fn history(
    state: &AppState,
    group_id: i64,
    user_id: i64,
    limit: i64,
) -> AppResult<Vec<AttendanceHistoryRow>> {
    if limit <= 0 {
        return Ok(Vec::new());
    }
    let mut conn = state.store.acquire().await?;
    AttendanceRepository::history(&mut conn, group_id, user_id, limit).await
}
