//! Event lifecycle operations: create, edit, delete, clone, list and view.

use serde::{Deserialize, Serialize};

use crate::db::models::{AttendanceStatus, Event, EventUpdate, NewEvent, RoleSpec};
use crate::db::{
    AttendanceRepository, EventRepository, RoleRepository, WaitlistRepository,
};
use crate::error::{AppError, AppResult};
use crate::AppState;

use super::capacity::{self, Displaced};
use super::messaging::edit_best_effort;
use super::parsing::{parse_local_time, parse_reminder_offsets, parse_roles};
use super::render::{self, RosterSnapshot};
use super::{reminders, roster, signup};

pub const MAX_LIST_LIMIT: i64 = 25;
pub const DEFAULT_LIST_LIMIT: i64 = 10;

/// Identity and permission flags supplied by whoever issues a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub can_manage_events: bool,
}

impl Caller {
    pub fn can_manage(&self, created_by: i64) -> bool {
        self.can_manage_events || self.user_id == created_by
    }
}

pub fn ensure_can_manage(caller: &Caller, created_by: i64) -> AppResult<()> {
    if caller.can_manage(created_by) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventInput {
    pub channel_id: i64,
    pub name: String,
    pub max_participants: i64,
    /// `name:capacity, ...`
    pub roles: String,
    pub starts_at: Option<String>,
    pub comment: Option<String>,
    pub reminders: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditEventInput {
    pub name: Option<String>,
    pub starts_at: Option<String>,
    pub max_participants: Option<i64>,
    /// Replaces the whole role set.
    pub roles: Option<String>,
    pub comment: Option<String>,
    /// Empty text clears the override and falls back to the defaults.
    pub reminders: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloneEventInput {
    pub name: String,
    pub channel_id: Option<i64>,
    pub starts_at: Option<String>,
    pub max_participants: Option<i64>,
    pub comment: Option<String>,
    pub reminders: Option<String>,
}

/// What an edit did to the roster besides the field changes.
#[derive(Debug, Clone, Serialize)]
pub struct EditReport {
    pub event: Event,
    pub waitlisted: Vec<Displaced>,
    pub removed: Vec<Displaced>,
    pub promoted: Vec<Displaced>,
}

pub(crate) fn validate_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}

pub(crate) fn validate_capacity(max_participants: i64) -> AppResult<i64> {
    if max_participants < 1 {
        return Err(AppError::Validation(
            "Participant limit must be at least 1".to_string(),
        ));
    }
    Ok(max_participants)
}

/// Optional start time text; absent or blank means unscheduled.
pub(crate) fn parse_start(input: Option<&str>, state: &AppState) -> AppResult<Option<i64>> {
    match input.map(str::trim) {
        Some(text) if !text.is_empty() => {
            parse_local_time(text, state.config.scheduler.timezone).map(Some)
        }
        _ => Ok(None),
    }
}

/// Optional offsets text; absent or blank means "no override".
pub(crate) fn parse_offsets(input: Option<&str>) -> AppResult<Option<Vec<i64>>> {
    match input.map(str::trim) {
        Some(text) if !text.is_empty() => parse_reminder_offsets(text).map(Some),
        _ => Ok(None),
    }
}

async fn load_roster(state: &AppState, event_id: i64) -> AppResult<RosterSnapshot> {
    let mut conn = state.store.acquire().await?;
    roster::load_snapshot(&mut conn, event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))
}

/// Store a new event with its reminders, then post its roster.
pub(crate) async fn create_and_post(
    state: &AppState,
    new_event: &NewEvent,
    now: i64,
) -> AppResult<RosterSnapshot> {
    let mut tx = state.store.begin().await?;
    let event = EventRepository::create(tx.conn(), new_event, now).await?;
    reminders::reset_reminders(
        tx.conn(),
        &event,
        None,
        &state.config.roster.default_reminder_offsets,
        now,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        "Created event {} '{}' in group {} by {}",
        event.id,
        event.name,
        event.group_id,
        event.created_by
    );
    roster::publish(state, event.id).await;
    load_roster(state, event.id).await
}

pub async fn create_event(
    state: &AppState,
    group_id: i64,
    caller: &Caller,
    input: &CreateEventInput,
    now: i64,
) -> AppResult<RosterSnapshot> {
    let new_event = NewEvent {
        group_id,
        channel_id: input.channel_id,
        name: validate_name(&input.name)?,
        starts_at: parse_start(input.starts_at.as_deref(), state)?.unwrap_or(0),
        comment: input.comment.clone().unwrap_or_default(),
        max_participants: validate_capacity(input.max_participants)?,
        created_by: caller.user_id,
        roles: parse_roles(&input.roles)?,
        reminder_offsets: parse_offsets(input.reminders.as_deref())?.unwrap_or_default(),
    };
    create_and_post(state, &new_event, now).await
}

/// Apply a partial edit as one transaction: field changes, role
/// replacement, capacity enforcement, reminder recompute and promotion.
pub async fn edit_event(
    state: &AppState,
    caller: &Caller,
    event_id: i64,
    input: &EditEventInput,
    now: i64,
) -> AppResult<EditReport> {
    let name = input.name.as_deref().map(validate_name).transpose()?;
    let starts_at = parse_start(input.starts_at.as_deref(), state)?;
    let max_participants = input.max_participants.map(validate_capacity).transpose()?;
    let roles = input.roles.as_deref().map(parse_roles).transpose()?;
    let offsets: Option<Vec<i64>> = match input.reminders.as_deref() {
        Some(text) => Some(parse_offsets(Some(text))?.unwrap_or_default()),
        None => None,
    };

    let mut tx = state.store.begin().await?;
    let current = EventRepository::find_by_id(tx.conn(), event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;
    ensure_can_manage(caller, current.created_by)?;

    let update = EventUpdate {
        name,
        starts_at,
        comment: input.comment.clone(),
        max_participants,
        reminder_offsets: None,
    };
    let event = if update.is_empty() {
        current
    } else {
        EventRepository::update(tx.conn(), event_id, &update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?
    };

    let mut removed = Vec::new();
    if let Some(roles) = &roles {
        RoleRepository::replace(tx.conn(), event_id, roles).await?;
        removed.extend(drop_stale_waitlist(tx.conn(), &event, roles, now).await?);
    }

    let report = capacity::enforce(tx.conn(), &event, now).await?;
    removed.extend(report.removed);

    if starts_at.is_some() || offsets.is_some() {
        reminders::reset_reminders(
            tx.conn(),
            &event,
            offsets.as_deref(),
            &state.config.roster.default_reminder_offsets,
            now,
        )
        .await?;
    }

    let promoted = signup::promote_waitlist(
        tx.conn(),
        &event,
        now,
        state.config.roster.promotion_policy,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        "Event {} edited by {}: {} waitlisted, {} removed, {} promoted",
        event_id,
        caller.user_id,
        report.waitlisted.len(),
        removed.len(),
        promoted.len()
    );
    roster::after_change(state, &event, &promoted).await;

    let event = load_roster(state, event_id).await?.event;
    Ok(EditReport {
        event,
        waitlisted: report.waitlisted,
        removed,
        promoted,
    })
}

/// Waitlist entries whose role is gone or disabled after a role replacement.
async fn drop_stale_waitlist(
    conn: &mut sqlx::SqliteConnection,
    event: &Event,
    roles: &[RoleSpec],
    now: i64,
) -> AppResult<Vec<Displaced>> {
    let mut dropped = Vec::new();
    for entry in WaitlistRepository::list(&mut *conn, event.id).await? {
        let open = roles
            .iter()
            .any(|r| r.name == entry.role_name && r.capacity > 0);
        if open {
            continue;
        }
        WaitlistRepository::delete(&mut *conn, event.id, entry.user_id).await?;
        AttendanceRepository::record(
            &mut *conn,
            event.group_id,
            event.id,
            entry.user_id,
            &entry.role_name,
            AttendanceStatus::Removed,
            now,
        )
        .await?;
        dropped.push((entry.user_id, entry.role_name));
    }
    Ok(dropped)
}

/// Delete the event and everything attached to it, then mark its roster post.
pub async fn delete_event(state: &AppState, caller: &Caller, event_id: i64) -> AppResult<()> {
    let mut tx = state.store.begin().await?;
    let event = EventRepository::find_by_id(tx.conn(), event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;
    ensure_can_manage(caller, event.created_by)?;
    EventRepository::delete(tx.conn(), event_id).await?;
    tx.commit().await?;

    tracing::info!("Event {} deleted by {}", event_id, caller.user_id);

    if let Some(message_id) = event.message_id {
        edit_best_effort(
            state.messenger.as_ref(),
            event.channel_id,
            message_id,
            &render::deleted_notice(),
            "roster post",
        )
        .await;
    }
    Ok(())
}

/// New event with the source's roles; other fields default to the source's.
pub async fn clone_event(
    state: &AppState,
    caller: &Caller,
    source_id: i64,
    input: &CloneEventInput,
    now: i64,
) -> AppResult<RosterSnapshot> {
    let source = load_roster(state, source_id).await?;
    if source.roles.is_empty() {
        return Err(AppError::Validation(
            "The source event has no roles; nothing to clone".to_string(),
        ));
    }

    let new_event = NewEvent {
        group_id: source.event.group_id,
        channel_id: input.channel_id.unwrap_or(source.event.channel_id),
        name: validate_name(&input.name)?,
        starts_at: parse_start(input.starts_at.as_deref(), state)?
            .unwrap_or(source.event.starts_at),
        comment: input
            .comment
            .clone()
            .unwrap_or_else(|| source.event.comment.clone()),
        max_participants: validate_capacity(
            input.max_participants.unwrap_or(source.event.max_participants),
        )?,
        created_by: caller.user_id,
        roles: source.roles.iter().map(RoleSpec::from).collect(),
        reminder_offsets: parse_offsets(input.reminders.as_deref())?
            .unwrap_or_else(|| source.event.reminder_offsets()),
    };
    create_and_post(state, &new_event, now).await
}

/// Unscheduled events first, then upcoming ones by start time.
pub async fn list_upcoming(
    state: &AppState,
    group_id: i64,
    now: i64,
    limit: i64,
) -> AppResult<Vec<Event>> {
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(AppError::Validation(format!(
            "Limit must be between 1 and {}",
            MAX_LIST_LIMIT
        )));
    }
    let mut conn = state.store.acquire().await?;
    EventRepository::list_upcoming(&mut conn, group_id, now, limit).await
}

pub async fn roster_snapshot(state: &AppState, event_id: i64) -> AppResult<RosterSnapshot> {
    load_roster(state, event_id).await
}
