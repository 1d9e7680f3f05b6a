use serde::Serialize;
use sqlx::FromRow;

use super::event::decode_offsets;
use super::roster::RoleSpec;
use super::template::decode_roles;

/// A weekly recurrence that materializes events ahead of their start.
///
/// `generate_at` is `next_run_at - lead_time_hours * 3600`, clamped at zero.
/// The role map, capacity and comment are snapshots taken at creation and
/// act as overrides (or fallbacks) for the linked template.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Schedule {
    pub id: i64,
    pub group_id: i64,
    pub channel_id: i64,
    pub template_id: Option<i64>,
    pub name_pattern: String,
    pub comment: String,
    pub max_participants: i64,
    #[serde(skip)]
    pub roles_json: String,
    pub weekday: i64,
    pub time_of_day: String,
    pub interval_days: i64,
    pub lead_time_hours: i64,
    #[serde(skip)]
    pub reminder_offsets: String,
    pub next_run_at: i64,
    pub generate_at: i64,
    pub created_by: i64,
    pub created_at: i64,
}

impl Schedule {
    pub fn roles(&self) -> Vec<RoleSpec> {
        decode_roles(&self.roles_json)
    }

    pub fn reminder_offsets(&self) -> Vec<i64> {
        decode_offsets(&self.reminder_offsets)
    }
}

#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub group_id: i64,
    pub channel_id: i64,
    pub template_id: Option<i64>,
    pub name_pattern: String,
    pub comment: String,
    pub max_participants: i64,
    pub roles: Vec<RoleSpec>,
    pub weekday: i64,
    pub time_of_day: String,
    pub interval_days: i64,
    pub lead_time_hours: i64,
    pub reminder_offsets: Vec<i64>,
    pub next_run_at: i64,
    pub created_by: i64,
}

/// `max(next_run_at - lead_time_hours * 3600, 0)`
pub fn generate_at_for(next_run_at: i64, lead_time_hours: i64) -> i64 {
    next_run_at
        .saturating_sub(lead_time_hours.saturating_mul(3600))
        .max(0)
}
