pub mod attendance;
pub mod capacity;
pub mod discord;
pub mod events;
pub mod init;
pub mod messaging;
pub mod parsing;
pub mod recurrence;
pub mod reminders;
pub mod render;
pub mod roster;
pub mod schedules;
pub mod signup;
pub mod templates;

/// Wall-clock "now" in epoch seconds, the unit every service takes.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
