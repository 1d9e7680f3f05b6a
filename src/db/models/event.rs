use serde::Serialize;
use sqlx::FromRow;

use super::roster::RoleSpec;

/// A sign-up event (raid) posted into a group channel.
///
/// `starts_at` is epoch seconds; `0` means the event has no start time yet.
/// Reminder offsets are stored comma-encoded; use [`Event::reminder_offsets`]
/// to read them.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Event {
    pub id: i64,
    pub group_id: i64,
    pub channel_id: i64,
    pub message_id: Option<i64>,
    pub name: String,
    pub starts_at: i64,
    pub comment: String,
    pub max_participants: i64,
    pub created_by: i64,
    pub created_at: i64,
    #[serde(skip)]
    pub reminder_offsets: String,
}

impl Event {
    pub fn is_scheduled(&self) -> bool {
        self.starts_at > 0
    }

    /// Stored reminder offsets in seconds. Non-positive values are dropped.
    pub fn reminder_offsets(&self) -> Vec<i64> {
        decode_offsets(&self.reminder_offsets)
    }
}

/// Input for inserting a new event together with its role set.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub group_id: i64,
    pub channel_id: i64,
    pub name: String,
    pub starts_at: i64,
    pub comment: String,
    pub max_participants: i64,
    pub created_by: i64,
    pub roles: Vec<RoleSpec>,
    pub reminder_offsets: Vec<i64>,
}

/// Partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct EventUpdate {
    pub name: Option<String>,
    pub starts_at: Option<i64>,
    pub comment: Option<String>,
    pub max_participants: Option<i64>,
    pub reminder_offsets: Option<Vec<i64>>,
}

impl EventUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.starts_at.is_none()
            && self.comment.is_none()
            && self.max_participants.is_none()
            && self.reminder_offsets.is_none()
    }
}

pub fn encode_offsets(offsets: &[i64]) -> String {
    offsets
        .iter()
        .filter(|o| **o > 0)
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn decode_offsets(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|chunk| chunk.trim().parse::<i64>().ok())
        .filter(|o| *o > 0)
        .collect()
}
