//! Lead-time reminders and the polling tick that fires them.

use sqlx::SqliteConnection;

use crate::db::models::Event;
use crate::db::{EventRepository, ReminderRepository, ScheduleRepository};
use crate::error::AppResult;
use crate::AppState;

use super::messaging::deliver_best_effort;
use super::{recurrence, render};

/// Replace all reminders of `event`.
///
/// `offsets` overrides (and is persisted on the event); otherwise the event's
/// stored offsets apply, falling back to `defaults`. Unscheduled or already
/// started events end up with no reminders. Fire times are clamped to `now`
/// so a late edit still produces an immediate reminder.
pub async fn reset_reminders(
    conn: &mut SqliteConnection,
    event: &Event,
    offsets: Option<&[i64]>,
    defaults: &[i64],
    now: i64,
) -> AppResult<Vec<i64>> {
    let mut effective: Vec<i64> = match offsets {
        Some(explicit) => {
            EventRepository::set_reminder_offsets(&mut *conn, event.id, explicit).await?;
            explicit.to_vec()
        }
        None => event.reminder_offsets(),
    };
    if effective.is_empty() {
        effective = defaults.to_vec();
    }
    effective.retain(|o| *o > 0);
    effective.sort_unstable_by(|a, b| b.cmp(a));
    effective.dedup();

    ReminderRepository::delete_for_event(&mut *conn, event.id).await?;

    let mut fire_times = Vec::new();
    if event.starts_at > 0 && event.starts_at > now {
        for offset in effective {
            let remind_at = (event.starts_at - offset).max(now);
            ReminderRepository::insert(&mut *conn, event.id, offset, remind_at).await?;
            fire_times.push(remind_at);
        }
    }
    Ok(fire_times)
}

/// Fire every due reminder. Each one is marked sent whatever the delivery
/// outcome, so a reminder is delivered at most once.
pub async fn send_due_reminders(state: &AppState, now: i64) -> AppResult<usize> {
    let due = {
        let mut conn = state.store.acquire().await?;
        ReminderRepository::list_due(&mut conn, now).await?
    };

    let mut delivered = 0;
    for reminder in due {
        let event = {
            let mut conn = state.store.acquire().await?;
            EventRepository::find_by_id(&mut conn, reminder.event_id).await?
        };

        if let Some(event) = event {
            let notice =
                render::reminder_notice(&event, reminder.offset_seconds, state.config.scheduler.timezone);
            if deliver_best_effort(state.messenger.as_ref(), event.channel_id, &notice, "reminder")
                .await
                .is_some()
            {
                delivered += 1;
            }
        }

        let mut conn = state.store.acquire().await?;
        ReminderRepository::mark_sent(&mut conn, reminder.event_id, reminder.offset_seconds).await?;
    }

    Ok(delivered)
}

/// Materialize every schedule whose publish time has come. One failing
/// schedule does not stop the rest.
pub async fn process_due_schedules(state: &AppState, now: i64) -> AppResult<usize> {
    let due = {
        let mut conn = state.store.acquire().await?;
        ScheduleRepository::list_due(&mut conn, now).await?
    };

    let mut created = 0;
    for schedule in due {
        match recurrence::maybe_generate(state, &schedule, now).await {
            Ok(true) => created += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!("Failed to generate event for schedule {}: {}", schedule.id, e);
            }
        }
    }
    Ok(created)
}

/// One scheduler pass: reminders first, then recurring schedules.
pub async fn tick(state: &AppState, now: i64) {
    match send_due_reminders(state, now).await {
        Ok(0) => {}
        Ok(n) => tracing::info!("Delivered {} reminder(s)", n),
        Err(e) => tracing::warn!("Reminder pass failed: {}", e),
    }
    match process_due_schedules(state, now).await {
        Ok(0) => {}
        Ok(n) => tracing::info!("Generated {} event(s) from schedules", n),
        Err(e) => tracing::warn!("Schedule pass failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::models::{NewEvent, RoleSpec};
    use crate::db::test_store;
    use crate::services::messaging::testing::RecordingMessenger;
    use crate::services::testing::state_with;

    const DEFAULTS: [i64; 3] = [3600, 900, 300];

    fn new_event(starts_at: i64, offsets: Vec<i64>) -> NewEvent {
        NewEvent {
            group_id: 1,
            channel_id: 2,
            name: "Raid".to_string(),
            starts_at,
            comment: String::new(),
            max_participants: 5,
            created_by: 9,
            roles: vec![RoleSpec::new("dps", 5)],
            reminder_offsets: offsets,
        }
    }

    #[tokio::test]
    async fn reminders_fall_between_now_and_start() {
        let store = test_store().await;
        let mut tx = store.begin().await.unwrap();
        let conn = tx.conn();
        let now = 10_000;
        let event = EventRepository::create(conn, &new_event(now + 1200, vec![]), now)
            .await
            .unwrap();

        reset_reminders(conn, &event, None, &DEFAULTS, now).await.unwrap();
        let reminders = ReminderRepository::list_for_event(conn, event.id).await.unwrap();

        assert_eq!(reminders.len(), 3);
        for r in &reminders {
            assert!(r.remind_at >= now && r.remind_at <= event.starts_at);
            assert!(!r.sent);
        }
        // The one-hour reminder is already overdue and clamps to now.
        let hour = reminders.iter().find(|r| r.offset_seconds == 3600).unwrap();
        assert_eq!(hour.remind_at, now);
    }

    #[tokio::test]
    async fn recompute_replaces_previous_reminders() {
        let store = test_store().await;
        let mut tx = store.begin().await.unwrap();
        let conn = tx.conn();
        let event = EventRepository::create(conn, &new_event(100_000, vec![]), 0)
            .await
            .unwrap();

        reset_reminders(conn, &event, None, &DEFAULTS, 0).await.unwrap();
        ReminderRepository::mark_sent(conn, event.id, 3600).await.unwrap();
        reset_reminders(conn, &event, Some(&[600][..]), &DEFAULTS, 0).await.unwrap();

        let reminders = ReminderRepository::list_for_event(conn, event.id).await.unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!((reminders[0].offset_seconds, reminders[0].remind_at), (600, 99_400));

        let stored = EventRepository::find_by_id(conn, event.id).await.unwrap().unwrap();
        assert_eq!(stored.reminder_offsets(), vec![600]);
    }

    #[tokio::test]
    async fn unscheduled_or_past_events_get_no_reminders() {
        let store = test_store().await;
        let mut tx = store.begin().await.unwrap();
        let conn = tx.conn();

        let unscheduled = EventRepository::create(conn, &new_event(0, vec![]), 0).await.unwrap();
        let past = EventRepository::create(conn, &new_event(50, vec![]), 0).await.unwrap();
        reset_reminders(conn, &unscheduled, None, &DEFAULTS, 100).await.unwrap();
        reset_reminders(conn, &past, None, &DEFAULTS, 100).await.unwrap();

        assert!(ReminderRepository::list_for_event(conn, unscheduled.id).await.unwrap().is_empty());
        assert!(ReminderRepository::list_for_event(conn, past.id).await.unwrap().is_empty());
    }

    async fn seed_due_reminder(state: &AppState, starts_at: i64) -> Event {
        let mut tx = state.store.begin().await.unwrap();
        let event = EventRepository::create(tx.conn(), &new_event(starts_at, vec![900]), 0)
            .await
            .unwrap();
        reset_reminders(tx.conn(), &event, None, &DEFAULTS, 0).await.unwrap();
        tx.commit().await.unwrap();
        event
    }

    #[tokio::test]
    async fn tick_delivers_once_and_marks_sent() {
        let messenger = Arc::new(RecordingMessenger::default());
        let state = state_with(messenger.clone()).await;
        let event = seed_due_reminder(&state, 10_000).await;

        tick(&state, 9_200).await;
        tick(&state, 9_300).await;

        let texts = messenger.delivered_texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("starts in 15 min"));

        let mut conn = state.store.acquire().await.unwrap();
        let reminders = ReminderRepository::list_for_event(&mut conn, event.id).await.unwrap();
        assert!(reminders.iter().all(|r| r.sent));
    }

    #[tokio::test]
    async fn failed_delivery_still_marks_sent() {
        let messenger = Arc::new(RecordingMessenger::failing());
        let state = state_with(messenger.clone()).await;
        let event = seed_due_reminder(&state, 10_000).await;

        let delivered = send_due_reminders(&state, 9_200).await.unwrap();
        assert_eq!(delivered, 0);

        messenger.set_failing(false);
        assert_eq!(send_due_reminders(&state, 9_300).await.unwrap(), 0);

        let mut conn = state.store.acquire().await.unwrap();
        let reminders = ReminderRepository::list_for_event(&mut conn, event.id).await.unwrap();
        assert!(reminders.iter().all(|r| r.sent));
    }

    #[tokio::test]
    async fn nothing_fires_before_its_time() {
        let messenger = Arc::new(RecordingMessenger::default());
        let state = state_with(messenger.clone()).await;
        seed_due_reminder(&state, 10_000).await;

        assert_eq!(send_due_reminders(&state, 9_000).await.unwrap(), 0);
        assert!(messenger.sent().is_empty());
    }
}
