//! Per-user sign-up state machine and the waitlist promotion sweep.
//!
//! A user is in exactly one of three states per event: not signed up,
//! signed up for a role, or waitlisted for a role. All transitions run inside
//! one [`RosterTx`](crate::db::RosterTx); roster posts and announcements are
//! refreshed after commit.

use std::collections::HashMap;

use serde::Serialize;
use sqlx::SqliteConnection;

use crate::config::PromotionPolicy;
use crate::db::models::{AttendanceStatus, Event};
use crate::db::{
    AttendanceRepository, EventRepository, RoleRepository, SignupRepository, WaitlistRepository,
};
use crate::error::{AppError, AppResult};
use crate::AppState;

use super::roster;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SignupOutcome {
    Joined { role: String },
    Switched { from: String, to: String },
    Waitlisted { role: String },
    WaitlistUpdated { from: String, to: String },
    Left { role: String },
    LeftWaitlist { role: String },
    NotSignedUp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignupResult {
    #[serde(flatten)]
    pub outcome: SignupOutcome,
    /// Users moved from the waitlist as a consequence, as (user, role).
    pub promotions: Vec<(i64, String)>,
}

impl SignupResult {
    fn new(outcome: SignupOutcome) -> Self {
        Self {
            outcome,
            promotions: Vec::new(),
        }
    }
}

async fn log(
    conn: &mut SqliteConnection,
    event: &Event,
    user_id: i64,
    role: &str,
    status: AttendanceStatus,
    now: i64,
) -> AppResult<()> {
    AttendanceRepository::record(conn, event.group_id, event.id, user_id, role, status, now)
        .await?;
    Ok(())
}

/// Handle "sign me up as `role_name`".
pub async fn apply_request(
    conn: &mut SqliteConnection,
    event: &Event,
    user_id: i64,
    role_name: &str,
    now: i64,
    policy: PromotionPolicy,
) -> AppResult<SignupResult> {
    let role = RoleRepository::find(&mut *conn, event.id, role_name)
        .await?
        .ok_or_else(|| {
            AppError::Validation(format!("There is no role '{}' in this event", role_name))
        })?;
    if role.capacity <= 0 {
        return Err(AppError::Validation(format!(
            "Role '{}' is disabled for this event",
            role_name
        )));
    }

    let signups = SignupRepository::list(&mut *conn, event.id).await?;
    let current = signups.iter().find(|s| s.user_id == user_id).cloned();
    let others = signups.iter().filter(|s| s.user_id != user_id);
    let total_others = others.clone().count() as i64;
    let role_others = others.filter(|s| s.role_name == role.name).count() as i64;
    let slot_free = total_others < event.max_participants && role_others < role.capacity;

    if let Some(signup) = current {
        if signup.role_name == role.name {
            return Err(AppError::Conflict(format!(
                "You are already signed up as {}",
                role.name
            )));
        }
        if !slot_free {
            return Err(AppError::Conflict(format!("Role {} is full", role.name)));
        }
        SignupRepository::update_role(&mut *conn, event.id, user_id, &role.name).await?;
        log(conn, event, user_id, &role.name, AttendanceStatus::Main, now).await?;
        let promotions = promote_waitlist(conn, event, now, policy).await?;
        return Ok(SignupResult {
            outcome: SignupOutcome::Switched {
                from: signup.role_name,
                to: role.name,
            },
            promotions,
        });
    }

    let waiting = WaitlistRepository::find(&mut *conn, event.id, user_id).await?;

    if slot_free {
        // A waitlisted user keeps their (earlier) queue timestamp as join time.
        let joined_at = match &waiting {
            Some(entry) => {
                WaitlistRepository::delete(&mut *conn, event.id, user_id).await?;
                entry.created_at
            }
            None => now,
        };
        SignupRepository::insert(&mut *conn, event.id, user_id, &role.name, joined_at).await?;
        log(conn, event, user_id, &role.name, AttendanceStatus::Main, now).await?;
        let promotions = promote_waitlist(conn, event, now, policy).await?;
        return Ok(SignupResult {
            outcome: SignupOutcome::Joined { role: role.name },
            promotions,
        });
    }

    let entry = WaitlistRepository::upsert(&mut *conn, event.id, user_id, &role.name, now).await?;
    log(conn, event, user_id, &entry.role_name, AttendanceStatus::Waitlist, now).await?;

    let outcome = match waiting {
        Some(previous) if previous.role_name != role.name => SignupOutcome::WaitlistUpdated {
            from: previous.role_name,
            to: role.name,
        },
        _ => SignupOutcome::Waitlisted { role: role.name },
    };
    Ok(SignupResult::new(outcome))
}

/// Handle "take me off this event".
pub async fn apply_leave(
    conn: &mut SqliteConnection,
    event: &Event,
    user_id: i64,
    now: i64,
    policy: PromotionPolicy,
) -> AppResult<SignupResult> {
    if let Some(signup) = SignupRepository::find(&mut *conn, event.id, user_id).await? {
        SignupRepository::delete(&mut *conn, event.id, user_id).await?;
        log(conn, event, user_id, &signup.role_name, AttendanceStatus::Removed, now).await?;
        let promotions = promote_waitlist(conn, event, now, policy).await?;
        return Ok(SignupResult {
            outcome: SignupOutcome::Left {
                role: signup.role_name,
            },
            promotions,
        });
    }

    if let Some(entry) = WaitlistRepository::find(&mut *conn, event.id, user_id).await? {
        WaitlistRepository::delete(&mut *conn, event.id, user_id).await?;
        log(conn, event, user_id, &entry.role_name, AttendanceStatus::Removed, now).await?;
        return Ok(SignupResult::new(SignupOutcome::LeftWaitlist {
            role: entry.role_name,
        }));
    }

    Ok(SignupResult::new(SignupOutcome::NotSignedUp))
}

/// Fill free slots from the waitlist in queue order.
///
/// Entries for roles that are gone or disabled are dropped. The walk stops
/// once the event is full. An entry whose role is full either stops the walk
/// ([`PromotionPolicy::StrictFifo`]) or is passed over
/// ([`PromotionPolicy::SkipBlocked`]). Promoted users keep their queue
/// timestamp as join time.
pub async fn promote_waitlist(
    conn: &mut SqliteConnection,
    event: &Event,
    now: i64,
    policy: PromotionPolicy,
) -> AppResult<Vec<(i64, String)>> {
    let roles = RoleRepository::list(&mut *conn, event.id).await?;
    let capacity: HashMap<String, i64> = roles.into_iter().map(|r| (r.name, r.capacity)).collect();
    let signups = SignupRepository::list(&mut *conn, event.id).await?;
    let waitlist = WaitlistRepository::list(&mut *conn, event.id).await?;

    let mut total = signups.len() as i64;
    let mut per_role: HashMap<String, i64> = HashMap::new();
    for signup in &signups {
        *per_role.entry(signup.role_name.clone()).or_insert(0) += 1;
    }

    let mut promotions = Vec::new();
    for entry in waitlist {
        let cap = match capacity.get(&entry.role_name) {
            Some(&cap) if cap > 0 => cap,
            _ => {
                WaitlistRepository::delete(&mut *conn, event.id, entry.user_id).await?;
                log(conn, event, entry.user_id, &entry.role_name, AttendanceStatus::Removed, now)
                    .await?;
                continue;
            }
        };

        if total >= event.max_participants {
            break;
        }

        let taken = per_role.get(&entry.role_name).copied().unwrap_or(0);
        if taken >= cap {
            match policy {
                PromotionPolicy::StrictFifo => break,
                PromotionPolicy::SkipBlocked => continue,
            }
        }

        WaitlistRepository::delete(&mut *conn, event.id, entry.user_id).await?;
        SignupRepository::insert(
            &mut *conn,
            event.id,
            entry.user_id,
            &entry.role_name,
            entry.created_at,
        )
        .await?;
        log(conn, event, entry.user_id, &entry.role_name, AttendanceStatus::Main, now).await?;

        total += 1;
        *per_role.entry(entry.role_name.clone()).or_insert(0) += 1;
        promotions.push((entry.user_id, entry.role_name));
    }

    if !promotions.is_empty() {
        tracing::info!(
            "Event {}: promoted {} user(s) from the waitlist",
            event.id,
            promotions.len()
        );
    }

    Ok(promotions)
}

async fn load_event(conn: &mut SqliteConnection, event_id: i64) -> AppResult<Event> {
    EventRepository::find_by_id(conn, event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))
}

/// request-role: transactional transition, then best-effort roster refresh.
pub async fn request_role(
    state: &AppState,
    event_id: i64,
    user_id: i64,
    role_name: &str,
    now: i64,
) -> AppResult<SignupResult> {
    let mut tx = state.store.begin().await?;
    let event = load_event(tx.conn(), event_id).await?;
    let result = apply_request(
        tx.conn(),
        &event,
        user_id,
        role_name.trim(),
        now,
        state.config.roster.promotion_policy,
    )
    .await?;
    tx.commit().await?;

    tracing::debug!("Event {}: user {} -> {:?}", event_id, user_id, result.outcome);
    roster::after_change(state, &event, &result.promotions).await;
    Ok(result)
}

/// leave: transactional transition, then best-effort roster refresh.
pub async fn leave(state: &AppState, event_id: i64, user_id: i64, now: i64) -> AppResult<SignupResult> {
    let mut tx = state.store.begin().await?;
    let event = load_event(tx.conn(), event_id).await?;
    let result = apply_leave(
        tx.conn(),
        &event,
        user_id,
        now,
        state.config.roster.promotion_policy,
    )
    .await?;
    tx.commit().await?;

    if result.outcome != SignupOutcome::NotSignedUp {
        roster::after_change(state, &event, &result.promotions).await;
    }
    Ok(result)
}
