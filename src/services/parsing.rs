//! Parsers for the textual inputs the chat commands accept: role specs,
//! reminder offsets and wall-clock times.

use chrono::{Duration, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::db::models::RoleSpec;
use crate::error::{AppError, AppResult};

/// Display and input format for start times.
pub const TIME_FMT: &str = "%H:%M %d.%m.%y";
const TIME_FMT_LONG_YEAR: &str = "%H:%M %d.%m.%Y";

/// Parse `name:capacity[, name:capacity...]`.
///
/// Empty chunks are skipped. A repeated name keeps its first position and
/// takes the last capacity.
pub fn parse_roles(input: &str) -> AppResult<Vec<RoleSpec>> {
    let mut roles: Vec<RoleSpec> = Vec::new();

    for chunk in input.split(',') {
        let part = chunk.trim();
        if part.is_empty() {
            continue;
        }
        let (name, count) = part.split_once(':').ok_or_else(|| {
            AppError::Validation(format!("Invalid role chunk '{}'. Use name:count", part))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation(format!(
                "Role name is missing in '{}'",
                part
            )));
        }
        let capacity: i64 = count.trim().parse().map_err(|_| {
            AppError::Validation(format!(
                "Invalid count for role '{}': '{}'",
                name,
                count.trim()
            ))
        })?;
        if capacity < 0 {
            return Err(AppError::Validation(format!(
                "Role capacity must be >= 0 for '{}'",
                name
            )));
        }

        match roles.iter_mut().find(|r| r.name == name) {
            Some(existing) => existing.capacity = capacity,
            None => roles.push(RoleSpec::new(name, capacity)),
        }
    }

    if roles.is_empty() {
        return Err(AppError::Validation(
            "At least one role must be specified".to_string(),
        ));
    }
    Ok(roles)
}

/// Parse comma-separated lead times such as `60, 30m, 2h, 1d`.
///
/// Bare numbers are minutes. The result is deduplicated and sorted from the
/// longest lead time to the shortest; empty input yields an empty list.
pub fn parse_reminder_offsets(input: &str) -> AppResult<Vec<i64>> {
    let mut offsets: Vec<i64> = Vec::new();

    for chunk in input.split(',') {
        let raw = chunk.trim().to_lowercase();
        if raw.is_empty() {
            continue;
        }
        let (amount, multiplier) = if let Some(v) = raw.strip_suffix('h') {
            (v, 3600)
        } else if let Some(v) = raw.strip_suffix('d') {
            (v, 86_400)
        } else if let Some(v) = raw.strip_suffix('m') {
            (v, 60)
        } else {
            (raw.as_str(), 60)
        };
        let amount: i64 = amount.trim().parse().map_err(|_| {
            AppError::Validation(format!(
                "Reminder offsets must be numbers such as 60, 30m or 2h (got '{}')",
                chunk.trim()
            ))
        })?;
        if amount <= 0 {
            return Err(AppError::Validation(
                "Reminder offsets must be positive".to_string(),
            ));
        }
        offsets.push(amount.saturating_mul(multiplier));
    }

    offsets.sort_unstable_by(|a, b| b.cmp(a));
    offsets.dedup();
    Ok(offsets)
}

/// Parse `HH:MM DD.MM.YY` (or a four-digit year) in `tz` into epoch seconds.
pub fn parse_local_time(input: &str, tz: Tz) -> AppResult<i64> {
    let value = input.trim();
    let long_year = value
        .rsplit('.')
        .next()
        .map(|year| year.len() == 4)
        .unwrap_or(false);
    let fmt = if long_year { TIME_FMT_LONG_YEAR } else { TIME_FMT };

    let naive = NaiveDateTime::parse_from_str(value, fmt).map_err(|_| {
        AppError::Validation(format!(
            "Invalid time '{}'. Use HH:MM DD.MM.YY, e.g. 20:30 24.12.25",
            value
        ))
    })?;
    local_to_timestamp(naive, tz).ok_or_else(|| {
        AppError::Validation(format!("Time '{}' does not exist in {}", value, tz))
    })
}

/// Resolve a local wall-clock time. Ambiguous times take the earlier instant;
/// times skipped by a DST jump move forward by an hour.
pub fn local_to_timestamp(naive: NaiveDateTime, tz: Tz) -> Option<i64> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.timestamp()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.timestamp()),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.timestamp()),
    }
}

/// Parse `HH:MM` into (hour, minute).
pub fn parse_time_of_day(input: &str) -> AppResult<(u32, u32)> {
    let (hour, minute) = input
        .trim()
        .split_once(':')
        .ok_or_else(|| AppError::Validation("Time must be in HH:MM format".to_string()))?;
    let hour: u32 = hour
        .trim()
        .parse()
        .map_err(|_| AppError::Validation("Hours and minutes must be numbers".to_string()))?;
    let minute: u32 = minute
        .trim()
        .parse()
        .map_err(|_| AppError::Validation("Hours and minutes must be numbers".to_string()))?;
    if hour > 23 || minute > 59 {
        return Err(AppError::Validation(
            "Hours must be 0-23 and minutes 0-59".to_string(),
        ));
    }
    Ok((hour, minute))
}

pub fn format_local_time(timestamp: i64, tz: Tz) -> String {
    match tz.timestamp_opt(timestamp, 0) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.format(TIME_FMT).to_string(),
        LocalResult::None => timestamp.to_string(),
    }
}

/// Human form of a lead time, e.g. `1 h 30 min`.
pub fn format_offset(offset_seconds: i64) -> String {
    let minutes = (offset_seconds / 60).max(0);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{} h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{} min", minutes));
    }
    if parts.is_empty() {
        return "less than a minute".to_string();
    }
    parts.join(" ")
}
