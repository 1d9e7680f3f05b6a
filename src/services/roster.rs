//! Keeping the chat-side roster post in sync with stored state.
//!
//! Called only after a transaction has committed; every function here is
//! best-effort and never fails the operation that triggered it.

use sqlx::SqliteConnection;

use crate::db::models::Event;
use crate::db::{EventRepository, RoleRepository, SignupRepository, WaitlistRepository};
use crate::error::AppResult;
use crate::AppState;

use super::messaging::{deliver_best_effort, edit_best_effort};
use super::render::{self, RosterSnapshot};

pub async fn load_snapshot(conn: &mut SqliteConnection, event_id: i64) -> AppResult<Option<RosterSnapshot>> {
    let Some(event) = EventRepository::find_by_id(&mut *conn, event_id).await? else {
        return Ok(None);
    };
    let roles = RoleRepository::list(&mut *conn, event_id).await?;
    let signups = SignupRepository::list(&mut *conn, event_id).await?;
    let waitlist = WaitlistRepository::list(&mut *conn, event_id).await?;
    Ok(Some(RosterSnapshot {
        event,
        roles,
        signups,
        waitlist,
    }))
}

async fn snapshot(state: &AppState, event_id: i64) -> Option<RosterSnapshot> {
    let loaded = match state.store.acquire().await {
        Ok(mut conn) => load_snapshot(&mut conn, event_id).await,
        Err(e) => Err(e),
    };
    match loaded {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!("Failed to load roster for event {}: {}", event_id, e);
            None
        }
    }
}

/// Post a fresh roster message for the event and remember its id.
pub async fn publish(state: &AppState, event_id: i64) -> Option<i64> {
    let snapshot = snapshot(state, event_id).await?;
    let message = render::roster_message(&snapshot, state.config.scheduler.timezone);
    let message_id = deliver_best_effort(
        state.messenger.as_ref(),
        snapshot.event.channel_id,
        &message,
        "roster post",
    )
    .await?;

    let stored = match state.store.begin().await {
        Ok(mut tx) => {
            match EventRepository::set_message_id(tx.conn(), event_id, Some(message_id)).await {
                Ok(()) => tx.commit().await,
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    };
    if let Err(e) = stored {
        tracing::warn!("Failed to store message id for event {}: {}", event_id, e);
    }
    Some(message_id)
}

/// Re-render the existing roster post, if there is one.
pub async fn refresh(state: &AppState, event_id: i64) -> bool {
    let Some(snapshot) = snapshot(state, event_id).await else {
        return false;
    };
    let Some(message_id) = snapshot.event.message_id else {
        return false;
    };
    let message = render::roster_message(&snapshot, state.config.scheduler.timezone);
    edit_best_effort(
        state.messenger.as_ref(),
        snapshot.event.channel_id,
        message_id,
        &message,
        "roster post",
    )
    .await
}

pub async fn announce_promotions(state: &AppState, event: &Event, promotions: &[(i64, String)]) {
    if promotions.is_empty() {
        return;
    }
    let notice = render::promotion_notice(event, promotions);
    deliver_best_effort(
        state.messenger.as_ref(),
        event.channel_id,
        &notice,
        "promotion notice",
    )
    .await;
}

/// Refresh the post and announce promotions after a committed roster change.
pub async fn after_change(state: &AppState, event: &Event, promotions: &[(i64, String)]) {
    refresh(state, event.id).await;
    announce_promotions(state, event, promotions).await;
}
