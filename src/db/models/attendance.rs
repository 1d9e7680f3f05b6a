use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Main,
    Waitlist,
    Removed,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Main => "main",
            AttendanceStatus::Waitlist => "waitlist",
            AttendanceStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(AttendanceStatus::Main),
            "waitlist" => Ok(AttendanceStatus::Waitlist),
            "removed" => Ok(AttendanceStatus::Removed),
            other => Err(format!("unknown attendance status '{}'", other)),
        }
    }
}

/// Append-only attendance log row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub group_id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub role_name: String,
    pub status: String,
    pub recorded_at: i64,
}

/// Attendance row joined with the event name (absent once the event is deleted).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AttendanceHistoryRow {
    pub id: i64,
    pub event_id: i64,
    pub event_name: Option<String>,
    pub role_name: String,
    pub status: String,
    pub recorded_at: i64,
}

/// Per-user, per-role count of events where the user's final status was `main`.
#[derive(Debug, Clone, FromRow)]
pub struct AttendanceCount {
    pub user_id: i64,
    pub role_name: String,
    pub attended: i64,
}
