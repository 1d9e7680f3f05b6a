//! Creating, listing and deleting recurring schedules. Materialization of
//! the events they describe lives in [`super::recurrence`].

use serde::{Deserialize, Serialize};

use crate::db::models::{NewSchedule, RoleSpec, Schedule};
use crate::db::{ScheduleRepository, TemplateRepository};
use crate::error::{AppError, AppResult};
use crate::AppState;

use super::events::{ensure_can_manage, parse_offsets, validate_capacity, Caller};
use super::parsing::{parse_roles, parse_time_of_day};
use super::recurrence::next_occurrence;

pub const DEFAULT_INTERVAL_DAYS: i64 = 7;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateScheduleInput {
    pub channel_id: i64,
    /// Template to take roles, capacity and comment from at generation time.
    pub template: Option<String>,
    /// strftime pattern for event names; defaults to the template name.
    pub name_pattern: Option<String>,
    pub roles: Option<String>,
    pub comment: Option<String>,
    pub max_participants: Option<i64>,
    /// Monday = 0.
    pub weekday: i64,
    /// `HH:MM` local time.
    pub time_of_day: String,
    pub interval_days: Option<i64>,
    #[serde(default)]
    pub lead_time_hours: i64,
    pub reminders: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleView {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub roles: Vec<RoleSpec>,
    pub reminder_offsets: Vec<i64>,
}

impl From<Schedule> for ScheduleView {
    fn from(schedule: Schedule) -> Self {
        Self {
            roles: schedule.roles(),
            reminder_offsets: schedule.reminder_offsets(),
            schedule,
        }
    }
}

/// The publish window has to close before the next occurrence opens.
pub fn validate_window(interval_days: i64, lead_time_hours: i64) -> AppResult<()> {
    if interval_days < 1 {
        return Err(AppError::Validation(
            "Interval must be at least 1 day".to_string(),
        ));
    }
    if lead_time_hours < 0 {
        return Err(AppError::Validation(
            "Lead time cannot be negative".to_string(),
        ));
    }
    let (Some(lead_seconds), Some(interval_seconds)) = (
        lead_time_hours.checked_mul(3600),
        interval_days.checked_mul(86_400),
    ) else {
        return Err(AppError::Validation(
            "Interval or lead time is out of range".to_string(),
        ));
    };
    if lead_seconds >= interval_seconds {
        return Err(AppError::Validation(format!(
            "Lead time of {}h must be shorter than the {}-day interval",
            lead_time_hours, interval_days
        )));
    }
    Ok(())
}

pub async fn create_schedule(
    state: &AppState,
    group_id: i64,
    caller: &Caller,
    input: &CreateScheduleInput,
    now: i64,
) -> AppResult<ScheduleView> {
    if !(0..=6).contains(&input.weekday) {
        return Err(AppError::Validation(
            "Weekday must be between 0 (Monday) and 6 (Sunday)".to_string(),
        ));
    }
    let (hour, minute) = parse_time_of_day(&input.time_of_day)?;
    let interval_days = input.interval_days.unwrap_or(DEFAULT_INTERVAL_DAYS);
    validate_window(interval_days, input.lead_time_hours)?;
    let max_participants = input.max_participants.map(validate_capacity).transpose()?;
    let explicit_roles = input.roles.as_deref().map(parse_roles).transpose()?;
    let reminder_offsets = parse_offsets(input.reminders.as_deref())?.unwrap_or_default();

    let template = match input.template.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => {
            let mut conn = state.store.acquire().await?;
            let found = TemplateRepository::find_by_name(&mut conn, group_id, name).await?;
            Some(found.ok_or_else(|| AppError::NotFound(format!("Template '{}' not found", name)))?)
        }
        _ => None,
    };

    let roles = explicit_roles
        .or_else(|| template.as_ref().map(|t| t.roles()))
        .unwrap_or_default();
    if roles.is_empty() {
        return Err(AppError::Validation(
            "A schedule needs roles, either directly or from a template".to_string(),
        ));
    }

    let name_pattern = match input.name_pattern.as_deref().map(str::trim) {
        Some(pattern) if !pattern.is_empty() => pattern.to_string(),
        _ => template
            .as_ref()
            .map(|t| t.name.clone())
            .ok_or_else(|| AppError::Validation("Name pattern cannot be empty".to_string()))?,
    };

    let next_run_at = next_occurrence(
        input.weekday as u32,
        hour,
        minute,
        now,
        state.config.scheduler.timezone,
    )?;

    let new_schedule = NewSchedule {
        group_id,
        channel_id: input.channel_id,
        template_id: template.as_ref().map(|t| t.id),
        name_pattern,
        comment: input.comment.clone().unwrap_or_default(),
        // 0 defers to the template (or the role count) at generation time.
        max_participants: max_participants.unwrap_or(0),
        roles,
        weekday: input.weekday,
        time_of_day: format!("{:02}:{:02}", hour, minute),
        interval_days,
        lead_time_hours: input.lead_time_hours,
        reminder_offsets,
        next_run_at,
        created_by: caller.user_id,
    };

    let mut tx = state.store.begin().await?;
    let schedule = ScheduleRepository::create(tx.conn(), &new_schedule, now).await?;
    tx.commit().await?;

    tracing::info!(
        "Schedule {} created in group {}: first run at {}, generated at {}",
        schedule.id,
        group_id,
        schedule.next_run_at,
        schedule.generate_at
    );
    Ok(schedule.into())
}

pub async fn list_schedules(state: &AppState, group_id: i64) -> AppResult<Vec<ScheduleView>> {
    let mut conn = state.store.acquire().await?;
    let schedules = ScheduleRepository::list(&mut conn, group_id).await?;
    Ok(schedules.into_iter().map(ScheduleView::from).collect())
}

pub async fn delete_schedule(
    state: &AppState,
    group_id: i64,
    caller: &Caller,
    schedule_id: i64,
) -> AppResult<()> {
    let mut tx = state.store.begin().await?;
    let schedule = ScheduleRepository::find(tx.conn(), group_id, schedule_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Schedule {} not found", schedule_id)))?;
    ensure_can_manage(caller, schedule.created_by)?;
    ScheduleRepository::delete(tx.conn(), schedule_id).await?;
    tx.commit().await?;

    tracing::info!("Schedule {} deleted by {}", schedule_id, caller.user_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::services::messaging::testing::RecordingMessenger;
    use crate::services::templates::{self, TemplateInput};
    use crate::services::testing::state_with;

    const OWNER: Caller = Caller {
        user_id: 7,
        can_manage_events: false,
    };
    // Wednesday 2025-01-01 12:00:00 UTC
    const WED_NOON: i64 = 1_735_732_800;

    fn input(lead: i64) -> CreateScheduleInput {
        CreateScheduleInput {
            channel_id: 5,
            template: None,
            name_pattern: Some("Raid %d.%m".to_string()),
            roles: Some("tank:2, dps:6".to_string()),
            comment: None,
            max_participants: None,
            weekday: 4,
            time_of_day: "20:00".to_string(),
            interval_days: None,
            lead_time_hours: lead,
            reminders: None,
        }
    }

    #[test]
    fn publish_window_must_be_shorter_than_interval() {
        assert!(validate_window(7, 167).is_ok());
        assert!(validate_window(7, 168).is_err());
        assert!(validate_window(1, 0).is_ok());
        assert!(validate_window(0, 0).is_err());
        assert!(validate_window(7, -1).is_err());
    }

    #[test]
    fn oversized_window_values_are_rejected() {
        let cases = [
            (1, 3_000_000_000_000_000),
            (200_000_000_000_000, 0),
            (i64::MAX, i64::MAX),
        ];
        for (interval, lead) in cases {
            let err = validate_window(interval, lead).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{interval}/{lead}");
        }
    }

    #[tokio::test]
    async fn create_computes_next_run_and_generate_at() {
        let state = state_with(Arc::new(RecordingMessenger::default())).await;

        let view = create_schedule(&state, 1, &OWNER, &input(167), WED_NOON).await.unwrap();
        let friday_eight = WED_NOON + 2 * 86_400 + 8 * 3600;
        assert_eq!(view.schedule.next_run_at, friday_eight);
        assert_eq!(view.schedule.generate_at, friday_eight - 167 * 3600);
        assert_eq!(view.schedule.interval_days, 7);
        assert_eq!(view.roles.len(), 2);

        let err = create_schedule(&state, 1, &OWNER, &input(168), WED_NOON).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(list_schedules(&state, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_from_template_links_it_and_snapshots_roles() {
        let state = state_with(Arc::new(RecordingMessenger::default())).await;
        templates::save_template(
            &state,
            1,
            &OWNER,
            &TemplateInput {
                name: "Avalon".to_string(),
                max_participants: 10,
                roles: "tank:2, healer:2, dps:6".to_string(),
                comment: None,
                reminders: None,
            },
            0,
        )
        .await
        .unwrap();

        let mut from_template = input(24);
        from_template.template = Some("Avalon".to_string());
        from_template.roles = None;
        from_template.name_pattern = None;
        let view = create_schedule(&state, 1, &OWNER, &from_template, WED_NOON).await.unwrap();

        assert!(view.schedule.template_id.is_some());
        assert_eq!(view.schedule.name_pattern, "Avalon");
        assert_eq!(view.schedule.max_participants, 0);
        assert_eq!(view.roles.len(), 3);

        let mut missing = input(24);
        missing.template = Some("Ghost".to_string());
        assert!(matches!(
            create_schedule(&state, 1, &OWNER, &missing, WED_NOON).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_rejects_bad_fields() {
        let state = state_with(Arc::new(RecordingMessenger::default())).await;

        let mut bad_day = input(0);
        bad_day.weekday = 7;
        let mut bad_time = input(0);
        bad_time.time_of_day = "25:00".to_string();
        let mut no_roles = input(0);
        no_roles.roles = None;

        for bad in [bad_day, bad_time, no_roles] {
            assert!(matches!(
                create_schedule(&state, 1, &OWNER, &bad, WED_NOON).await,
                Err(AppError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn delete_requires_permission() {
        let state = state_with(Arc::new(RecordingMessenger::default())).await;
        let view = create_schedule(&state, 1, &OWNER, &input(1), WED_NOON).await.unwrap();
        let stranger = Caller {
            user_id: 99,
            can_manage_events: false,
        };

        assert!(matches!(
            delete_schedule(&state, 1, &stranger, view.schedule.id).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            delete_schedule(&state, 2, &OWNER, view.schedule.id).await,
            Err(AppError::NotFound(_))
        ));
        delete_schedule(&state, 1, &OWNER, view.schedule.id).await.unwrap();
        assert!(list_schedules(&state, 1).await.unwrap().is_empty());
    }
}
