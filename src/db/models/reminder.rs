use sqlx::FromRow;

/// One pending (or already fired) reminder for an event at a fixed lead time.
#[derive(Debug, Clone, FromRow)]
pub struct Reminder {
    pub event_id: i64,
    pub offset_seconds: i64,
    pub remind_at: i64,
    pub sent: bool,
}
