//! Per-group event templates and creating events from them.

use serde::{Deserialize, Serialize};

use crate::db::models::{NewEvent, NewTemplate, RoleSpec, Template};
use crate::db::TemplateRepository;
use crate::error::{AppError, AppResult};
use crate::AppState;

use super::events::{self, parse_offsets, parse_start, validate_capacity, validate_name, Caller};
use super::parsing::parse_roles;
use super::render::RosterSnapshot;

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateInput {
    pub name: String,
    pub max_participants: i64,
    pub roles: String,
    pub comment: Option<String>,
    pub reminders: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateUpdate {
    pub max_participants: Option<i64>,
    pub roles: Option<String>,
    pub comment: Option<String>,
    /// Empty text clears the template's reminder override.
    pub reminders: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UseTemplateInput {
    pub channel_id: i64,
    /// Name of the new event.
    pub name: String,
    pub starts_at: Option<String>,
    pub max_participants: Option<i64>,
    pub comment: Option<String>,
    pub reminders: Option<String>,
}

/// A template with its role map and reminder offsets decoded.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateView {
    #[serde(flatten)]
    pub template: Template,
    pub roles: Vec<RoleSpec>,
    pub reminder_offsets: Vec<i64>,
}

impl From<Template> for TemplateView {
    fn from(template: Template) -> Self {
        Self {
            roles: template.roles(),
            reminder_offsets: template.reminder_offsets(),
            template,
        }
    }
}

fn not_found(name: &str) -> AppError {
    AppError::NotFound(format!("Template '{}' not found", name))
}

/// Create the template, or overwrite every field of an existing one.
pub async fn save_template(
    state: &AppState,
    group_id: i64,
    caller: &Caller,
    input: &TemplateInput,
    now: i64,
) -> AppResult<TemplateView> {
    let template = NewTemplate {
        group_id,
        name: validate_name(&input.name)?,
        max_participants: validate_capacity(input.max_participants)?,
        roles: parse_roles(&input.roles)?,
        comment: input.comment.clone().unwrap_or_default(),
        reminder_offsets: parse_offsets(input.reminders.as_deref())?.unwrap_or_default(),
        created_by: caller.user_id,
    };

    let mut tx = state.store.begin().await?;
    let saved = TemplateRepository::upsert(tx.conn(), &template, now).await?;
    tx.commit().await?;

    tracing::info!("Template '{}' saved in group {}", saved.name, group_id);
    Ok(saved.into())
}

/// Change some fields of an existing template.
pub async fn update_template(
    state: &AppState,
    group_id: i64,
    name: &str,
    input: &TemplateUpdate,
    now: i64,
) -> AppResult<TemplateView> {
    let max_participants = input.max_participants.map(validate_capacity).transpose()?;
    let roles = input.roles.as_deref().map(parse_roles).transpose()?;
    let offsets: Option<Vec<i64>> = match input.reminders.as_deref() {
        Some(text) => Some(parse_offsets(Some(text))?.unwrap_or_default()),
        None => None,
    };

    let mut tx = state.store.begin().await?;
    let current = TemplateRepository::find_by_name(tx.conn(), group_id, name)
        .await?
        .ok_or_else(|| not_found(name))?;

    let merged = NewTemplate {
        group_id,
        name: current.name.clone(),
        max_participants: max_participants.unwrap_or(current.max_participants),
        roles: roles.unwrap_or_else(|| current.roles()),
        comment: input.comment.clone().unwrap_or_else(|| current.comment.clone()),
        reminder_offsets: offsets.unwrap_or_else(|| current.reminder_offsets()),
        created_by: current.created_by,
    };
    let saved = TemplateRepository::upsert(tx.conn(), &merged, now).await?;
    tx.commit().await?;

    Ok(saved.into())
}

pub async fn delete_template(state: &AppState, group_id: i64, name: &str) -> AppResult<()> {
    let mut tx = state.store.begin().await?;
    let deleted = TemplateRepository::delete(tx.conn(), group_id, name).await?;
    tx.commit().await?;
    if !deleted {
        return Err(not_found(name));
    }
    tracing::info!("Template '{}' deleted from group {}", name, group_id);
    Ok(())
}

pub async fn list_templates(state: &AppState, group_id: i64) -> AppResult<Vec<TemplateView>> {
    let mut conn = state.store.acquire().await?;
    let templates = TemplateRepository::list(&mut conn, group_id).await?;
    Ok(templates.into_iter().map(TemplateView::from).collect())
}

/// Create and post an event from a template. Explicit inputs override the
/// template's capacity, comment and reminder offsets.
pub async fn use_template(
    state: &AppState,
    group_id: i64,
    caller: &Caller,
    template_name: &str,
    input: &UseTemplateInput,
    now: i64,
) -> AppResult<RosterSnapshot> {
    let template = {
        let mut conn = state.store.acquire().await?;
        TemplateRepository::find_by_name(&mut conn, group_id, template_name)
            .await?
            .ok_or_else(|| not_found(template_name))?
    };
    let roles = template.roles();
    if roles.is_empty() {
        return Err(AppError::Validation(format!(
            "Template '{}' has no roles",
            template.name
        )));
    }

    let new_event = NewEvent {
        group_id,
        channel_id: input.channel_id,
        name: validate_name(&input.name)?,
        starts_at: parse_start(input.starts_at.as_deref(), state)?.unwrap_or(0),
        comment: input.comment.clone().unwrap_or_else(|| template.comment.clone()),
        max_participants: validate_capacity(
            input.max_participants.unwrap_or(template.max_participants),
        )?,
        created_by: caller.user_id,
        roles,
        reminder_offsets: parse_offsets(input.reminders.as_deref())?
            .unwrap_or_else(|| template.reminder_offsets()),
    };
    events::create_and_post(state, &new_event, now).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::ReminderRepository;
    use crate::services::messaging::testing::RecordingMessenger;
    use crate::services::testing::state_with;

    const LEAD: Caller = Caller {
        user_id: 42,
        can_manage_events: false,
    };

    fn input(name: &str, max: i64, roles: &str) -> TemplateInput {
        TemplateInput {
            name: name.to_string(),
            max_participants: max,
            roles: roles.to_string(),
            comment: None,
            reminders: None,
        }
    }

    #[tokio::test]
    async fn save_overwrites_existing_name() {
        let state = state_with(Arc::new(RecordingMessenger::default())).await;

        save_template(&state, 1, &LEAD, &input("Avalon", 5, "tank:1, dps:4"), 0)
            .await
            .unwrap();
        let saved = save_template(&state, 1, &LEAD, &input("Avalon", 8, "healer:2"), 1)
            .await
            .unwrap();

        assert_eq!(saved.template.max_participants, 8);
        assert_eq!(saved.roles, vec![RoleSpec::new("healer", 2)]);
        assert_eq!(list_templates(&state, 1).await.unwrap().len(), 1);
        assert!(list_templates(&state, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_requires_existing_template_and_keeps_other_fields() {
        let state = state_with(Arc::new(RecordingMessenger::default())).await;
        let missing = update_template(&state, 1, "Nope", &TemplateUpdate::default(), 0).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let mut original = input("Avalon", 5, "tank:1, dps:4");
        original.comment = Some("flasks".to_string());
        save_template(&state, 1, &LEAD, &original, 0).await.unwrap();

        let updated = update_template(
            &state,
            1,
            "Avalon",
            &TemplateUpdate {
                max_participants: Some(10),
                reminders: Some("2h".to_string()),
                ..Default::default()
            },
            1,
        )
        .await
        .unwrap();

        assert_eq!(updated.template.max_participants, 10);
        assert_eq!(updated.template.comment, "flasks");
        assert_eq!(updated.roles.len(), 2);
        assert_eq!(updated.reminder_offsets, vec![7200]);
    }

    #[tokio::test]
    async fn delete_reports_missing_template() {
        let state = state_with(Arc::new(RecordingMessenger::default())).await;
        save_template(&state, 1, &LEAD, &input("Avalon", 5, "dps:5"), 0).await.unwrap();

        delete_template(&state, 1, "Avalon").await.unwrap();
        assert!(matches!(
            delete_template(&state, 1, "Avalon").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn use_template_applies_overrides_and_template_offsets() {
        let state = state_with(Arc::new(RecordingMessenger::default())).await;
        let mut tpl = input("Avalon", 5, "tank:1, dps:4");
        tpl.comment = Some("flasks".to_string());
        tpl.reminders = Some("30".to_string());
        save_template(&state, 1, &LEAD, &tpl, 0).await.unwrap();

        let snapshot = use_template(
            &state,
            1,
            &LEAD,
            "Avalon",
            &UseTemplateInput {
                channel_id: 3,
                name: "Friday Avalon".to_string(),
                starts_at: Some("20:30 24.12.25".to_string()),
                max_participants: Some(3),
                comment: None,
                reminders: None,
            },
            1_766_000_000,
        )
        .await
        .unwrap();

        assert_eq!(snapshot.event.max_participants, 3);
        assert_eq!(snapshot.event.comment, "flasks");
        assert_eq!(snapshot.roles.len(), 2);
        assert!(snapshot.event.message_id.is_some());

        let mut conn = state.store.acquire().await.unwrap();
        let reminders = ReminderRepository::list_for_event(&mut conn, snapshot.event.id)
            .await
            .unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].offset_seconds, 1800);
    }

    #[tokio::test]
    async fn use_unknown_template_is_not_found() {
        let state = state_with(Arc::new(RecordingMessenger::default())).await;
        let err = use_template(
            &state,
            1,
            &LEAD,
            "Ghost",
            &UseTemplateInput {
                channel_id: 3,
                name: "x".to_string(),
                starts_at: None,
                max_participants: None,
                comment: None,
                reminders: None,
            },
            0,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
