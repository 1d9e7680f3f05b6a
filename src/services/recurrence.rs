//! Recurring schedules: computing the next weekly slot and materializing
//! events ahead of their start.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, Duration, NaiveTime, TimeZone};
use chrono_tz::Tz;

use crate::db::models::{NewEvent, Schedule};
use crate::db::{EventRepository, ScheduleRepository, TemplateRepository};
use crate::error::{AppError, AppResult};
use crate::AppState;

use super::parsing::{local_to_timestamp, parse_time_of_day};
use super::{reminders, roster};

/// Seconds added to the current run before looking for the next one, so the
/// slot just generated is never picked again.
const NEXT_RUN_GRACE: i64 = 60;

/// First instant strictly after `basis` whose wall-clock in `tz` falls on
/// `weekday` (Monday = 0) at `hour:minute`.
pub fn next_occurrence(weekday: u32, hour: u32, minute: u32, basis: i64, tz: Tz) -> AppResult<i64> {
    if weekday > 6 {
        return Err(AppError::Validation(
            "Weekday must be between 0 (Monday) and 6 (Sunday)".to_string(),
        ));
    }
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| AppError::Validation("Hours must be 0-23 and minutes 0-59".to_string()))?;
    let local = tz
        .timestamp_opt(basis, 0)
        .earliest()
        .ok_or_else(|| AppError::Validation(format!("Timestamp {} is out of range", basis)))?;

    let days_ahead = (7 + weekday as i64 - local.weekday().num_days_from_monday() as i64) % 7;
    let mut date = local.date_naive() + Duration::days(days_ahead);
    // Two tries cover the case where this week's slot already passed.
    for _ in 0..2 {
        if let Some(ts) = local_to_timestamp(date.and_time(time), tz) {
            if ts > basis {
                return Ok(ts);
            }
        }
        date += Duration::days(7);
    }
    Err(AppError::Internal(anyhow::anyhow!(
        "no weekly slot after {} for weekday {} at {:02}:{:02}",
        basis,
        weekday,
        hour,
        minute
    )))
}

/// Substitute strftime placeholders with the local start time. A pattern
/// with an invalid directive is used literally.
pub fn event_name(pattern: &str, starts_at: i64, tz: Tz) -> String {
    let items: Vec<Item> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return pattern.to_string();
    }
    let Some(local) = tz.timestamp_opt(starts_at, 0).earliest() else {
        return pattern.to_string();
    };
    let mut name = String::new();
    match write!(name, "{}", local.format_with_items(items.into_iter())) {
        Ok(()) => name,
        Err(_) => pattern.to_string(),
    }
}

/// Create the next event of `schedule` if its publish time has come.
///
/// Event creation, its reminders and advancing the schedule commit together;
/// the roster post is delivered afterwards. Returns `true` only when an
/// event was created and posted. A slot is never retried: a missing role
/// map or a failed delivery still advances the schedule.
pub async fn maybe_generate(state: &AppState, schedule: &Schedule, now: i64) -> AppResult<bool> {
    if now < schedule.generate_at {
        return Ok(false);
    }
    let tz = state.config.scheduler.timezone;

    let (hour, minute) = parse_time_of_day(&schedule.time_of_day).unwrap_or_else(|e| {
        tracing::warn!(
            "Schedule {} has unreadable time {:?} ({}), using 00:00",
            schedule.id,
            schedule.time_of_day,
            e
        );
        (0, 0)
    });
    let next_run_at = next_occurrence(
        schedule.weekday as u32,
        hour,
        minute,
        schedule.next_run_at + NEXT_RUN_GRACE,
        tz,
    )?;

    let mut tx = state.store.begin().await?;

    let template = match schedule.template_id {
        Some(id) => TemplateRepository::find_by_id(tx.conn(), id).await?,
        None => None,
    };

    let roles = template
        .as_ref()
        .map(|t| t.roles())
        .filter(|roles| !roles.is_empty())
        .unwrap_or_else(|| schedule.roles());
    if roles.is_empty() {
        ScheduleRepository::advance(tx.conn(), schedule.id, next_run_at, schedule.lead_time_hours)
            .await?;
        tx.commit().await?;
        tracing::warn!(
            "Schedule {} has no roles to create an event from; skipped to next run",
            schedule.id
        );
        return Ok(false);
    }

    let comment = if !schedule.comment.is_empty() {
        schedule.comment.clone()
    } else {
        template.as_ref().map(|t| t.comment.clone()).unwrap_or_default()
    };
    let max_participants = if schedule.max_participants > 0 {
        schedule.max_participants
    } else {
        template
            .as_ref()
            .map(|t| t.max_participants)
            .unwrap_or(roles.len() as i64)
    };
    let mut reminder_offsets = schedule.reminder_offsets();
    if reminder_offsets.is_empty() {
        reminder_offsets = template
            .as_ref()
            .map(|t| t.reminder_offsets())
            .unwrap_or_default();
    }

    let event = EventRepository::create(
        tx.conn(),
        &NewEvent {
            group_id: schedule.group_id,
            channel_id: schedule.channel_id,
            name: event_name(&schedule.name_pattern, schedule.next_run_at, tz),
            starts_at: schedule.next_run_at,
            comment,
            max_participants,
            created_by: schedule.created_by,
            roles,
            reminder_offsets,
        },
        now,
    )
    .await?;
    reminders::reset_reminders(
        tx.conn(),
        &event,
        None,
        &state.config.roster.default_reminder_offsets,
        now,
    )
    .await?;
    ScheduleRepository::advance(tx.conn(), schedule.id, next_run_at, schedule.lead_time_hours)
        .await?;
    tx.commit().await?;

    let posted = roster::publish(state, event.id).await.is_some();
    if posted {
        tracing::info!(
            "Created event {} from schedule {} starting at {}",
            event.id,
            schedule.id,
            schedule.next_run_at
        );
    } else {
        tracing::warn!(
            "Created event {} from schedule {} but could not post its roster",
            event.id,
            schedule.id
        );
    }
    Ok(posted)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::models::{generate_at_for, NewSchedule, NewTemplate, RoleSpec};
    use crate::db::{ReminderRepository, RoleRepository};
    use crate::services::messaging::testing::{RecordingMessenger, Sent};
    use crate::services::testing::state_with;

    // Wednesday 2025-01-01 12:00:00 UTC
    const WED_NOON: i64 = 1_735_732_800;
    const DAY: i64 = 86_400;

    #[test]
    fn next_occurrence_is_strictly_after_basis() {
        // Friday 20:00 after Wednesday noon.
        let fri = next_occurrence(4, 20, 0, WED_NOON, Tz::UTC).unwrap();
        assert_eq!(fri, WED_NOON + 2 * DAY + 8 * 3600);

        // Same weekday, earlier time of day -> next week.
        let wed_morning = next_occurrence(2, 9, 0, WED_NOON, Tz::UTC).unwrap();
        assert_eq!(wed_morning, WED_NOON + 7 * DAY - 3 * 3600);

        // Exactly at the basis is not "after".
        let same = next_occurrence(2, 12, 0, WED_NOON, Tz::UTC).unwrap();
        assert_eq!(same, WED_NOON + 7 * DAY);
    }

    #[test]
    fn next_occurrence_follows_local_wall_clock() {
        let berlin = chrono_tz::Europe::Berlin;
        // Saturday 2025-03-29 20:00 CET is 19:00 UTC; a week later it is CEST.
        let before = next_occurrence(5, 20, 0, WED_NOON + 87 * DAY, berlin).unwrap();
        let after = next_occurrence(5, 20, 0, before + NEXT_RUN_GRACE, berlin).unwrap();
        assert_eq!(after - before, 7 * DAY - 3600);
    }

    #[test]
    fn next_occurrence_rejects_bad_weekday() {
        assert!(next_occurrence(7, 0, 0, WED_NOON, Tz::UTC).is_err());
    }

    #[test]
    fn name_pattern_uses_start_time() {
        assert_eq!(event_name("Raid %d.%m", WED_NOON, Tz::UTC), "Raid 01.01");
        assert_eq!(event_name("Weekly raid", WED_NOON, Tz::UTC), "Weekly raid");
        assert_eq!(event_name("Broken %Q", WED_NOON, Tz::UTC), "Broken %Q");
    }

    async fn schedule_in(
        state: &AppState,
        template_id: Option<i64>,
        roles: Vec<RoleSpec>,
        next_run_at: i64,
        lead: i64,
    ) -> Schedule {
        let mut tx = state.store.begin().await.unwrap();
        let schedule = ScheduleRepository::create(
            tx.conn(),
            &NewSchedule {
                group_id: 1,
                channel_id: 55,
                template_id,
                name_pattern: "Raid %d.%m".to_string(),
                comment: String::new(),
                max_participants: 0,
                roles,
                weekday: 2,
                time_of_day: "12:00".to_string(),
                interval_days: 7,
                lead_time_hours: lead,
                reminder_offsets: vec![],
                next_run_at,
                created_by: 42,
            },
            0,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        schedule
    }

    #[tokio::test]
    async fn nothing_happens_before_generate_at() {
        let messenger = Arc::new(RecordingMessenger::default());
        let state = state_with(messenger.clone()).await;
        let schedule = schedule_in(&state, None, vec![RoleSpec::new("dps", 3)], WED_NOON, 24).await;

        assert_eq!(schedule.generate_at, WED_NOON - DAY);
        assert!(!maybe_generate(&state, &schedule, WED_NOON - DAY - 1).await.unwrap());
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn generates_event_from_template_and_advances() {
        let messenger = Arc::new(RecordingMessenger::default());
        let state = state_with(messenger.clone()).await;

        let template = {
            let mut tx = state.store.begin().await.unwrap();
            let t = TemplateRepository::upsert(
                tx.conn(),
                &NewTemplate {
                    group_id: 1,
                    name: "weekly".to_string(),
                    max_participants: 4,
                    roles: vec![RoleSpec::new("tank", 1), RoleSpec::new("dps", 3)],
                    comment: "bring flasks".to_string(),
                    reminder_offsets: vec![1800],
                    created_by: 42,
                },
                0,
            )
            .await
            .unwrap();
            tx.commit().await.unwrap();
            t
        };
        let schedule =
            schedule_in(&state, Some(template.id), vec![RoleSpec::new("x", 1)], WED_NOON, 24).await;

        let now = WED_NOON - DAY;
        assert!(maybe_generate(&state, &schedule, now).await.unwrap());

        let mut conn = state.store.acquire().await.unwrap();
        let events = EventRepository::list_upcoming(&mut conn, 1, now, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.name, "Raid 01.01");
        assert_eq!(event.starts_at, WED_NOON);
        assert_eq!(event.max_participants, 4);
        assert_eq!(event.comment, "bring flasks");
        assert_eq!(event.created_by, 42);
        assert!(event.message_id.is_some());

        let roles: Vec<String> = RoleRepository::list(&mut conn, event.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(roles, vec!["tank", "dps"]);

        let reminders = ReminderRepository::list_for_event(&mut conn, event.id).await.unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].remind_at, WED_NOON - 1800);

        let advanced = ScheduleRepository::find(&mut conn, 1, schedule.id).await.unwrap().unwrap();
        assert_eq!(advanced.next_run_at, WED_NOON + 7 * DAY);
        assert_eq!(advanced.generate_at, generate_at_for(WED_NOON + 7 * DAY, 24));

        assert!(matches!(messenger.sent()[0], Sent::Delivered { channel_id: 55, .. }));
    }

    #[tokio::test]
    async fn delivery_failure_advances_but_reports_false() {
        let messenger = Arc::new(RecordingMessenger::failing());
        let state = state_with(messenger).await;
        let schedule = schedule_in(&state, None, vec![RoleSpec::new("dps", 3)], WED_NOON, 0).await;

        assert!(!maybe_generate(&state, &schedule, WED_NOON).await.unwrap());

        let mut conn = state.store.acquire().await.unwrap();
        let advanced = ScheduleRepository::find(&mut conn, 1, schedule.id).await.unwrap().unwrap();
        assert_eq!(advanced.next_run_at, WED_NOON + 7 * DAY);
        // The event exists without a roster post.
        let events = EventRepository::list_upcoming(&mut conn, 1, 0, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message_id, None);
        assert_eq!(events[0].max_participants, 1);
    }

    #[tokio::test]
    async fn schedule_without_roles_only_advances() {
        let messenger = Arc::new(RecordingMessenger::default());
        let state = state_with(messenger.clone()).await;
        let schedule = schedule_in(&state, None, vec![], WED_NOON, 0).await;

        assert!(!maybe_generate(&state, &schedule, WED_NOON).await.unwrap());

        let mut conn = state.store.acquire().await.unwrap();
        assert!(EventRepository::list_upcoming(&mut conn, 1, 0, 10).await.unwrap().is_empty());
        let advanced = ScheduleRepository::find(&mut conn, 1, schedule.id).await.unwrap().unwrap();
        assert_eq!(advanced.next_run_at, WED_NOON + 7 * DAY);
        assert!(messenger.sent().is_empty());
    }
}
