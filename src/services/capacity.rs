//! Capacity enforcement: brings an event's signups back within its per-role
//! and total limits after capacities or the role set change.

use std::collections::HashMap;

use sqlx::SqliteConnection;

use crate::db::models::{AttendanceStatus, Event, Role, Signup};
use crate::db::{AttendanceRepository, RoleRepository, SignupRepository, WaitlistRepository};
use crate::error::AppResult;

/// A signup that had to leave the roster, as (user, role).
pub type Displaced = (i64, String);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnforceReport {
    /// Moved to the waitlist, keeping their desired role.
    pub waitlisted: Vec<Displaced>,
    /// Dropped entirely because their role no longer exists or is disabled.
    pub removed: Vec<Displaced>,
}

impl EnforceReport {
    pub fn is_empty(&self) -> bool {
        self.waitlisted.is_empty() && self.removed.is_empty()
    }
}

/// Decide which signups overflow. `signups` must be in FIFO order.
///
/// Returns indices into `signups`: (to waitlist, to remove), each in FIFO order.
pub fn plan_overflow(roles: &[Role], signups: &[Signup], max_participants: i64) -> (Vec<usize>, Vec<usize>) {
    let capacity: HashMap<&str, i64> = roles.iter().map(|r| (r.name.as_str(), r.capacity)).collect();
    let mut flagged = vec![false; signups.len()];
    let mut overflow = Vec::new();
    let mut removals = Vec::new();

    // Per-role overflow and signups whose role vanished.
    let mut per_role: HashMap<&str, i64> = HashMap::new();
    for (idx, signup) in signups.iter().enumerate() {
        match capacity.get(signup.role_name.as_str()) {
            None => {
                flagged[idx] = true;
                removals.push(idx);
            }
            Some(&cap) => {
                let count = per_role.entry(signup.role_name.as_str()).or_insert(0);
                *count += 1;
                if *count > cap {
                    flagged[idx] = true;
                    overflow.push(idx);
                }
            }
        }
    }

    // Whatever still exceeds the event total, latest joiners first out.
    let mut kept = 0i64;
    for (idx, _) in signups.iter().enumerate() {
        if flagged[idx] {
            continue;
        }
        kept += 1;
        if kept > max_participants {
            flagged[idx] = true;
            overflow.push(idx);
        }
    }
    overflow.sort_unstable();

    // Only a role that can ever take someone is worth waiting for.
    let (waitlist, demoted): (Vec<usize>, Vec<usize>) = overflow.into_iter().partition(|&idx| {
        capacity
            .get(signups[idx].role_name.as_str())
            .map(|&cap| cap > 0)
            .unwrap_or(false)
    });
    removals.extend(demoted);
    removals.sort_unstable();

    debug_assert!({
        let mut totals: HashMap<&str, i64> = HashMap::new();
        let mut total = 0;
        for (idx, s) in signups.iter().enumerate() {
            if !waitlist.contains(&idx) && !removals.contains(&idx) {
                *totals.entry(s.role_name.as_str()).or_insert(0) += 1;
                total += 1;
            }
        }
        total <= max_participants.max(0)
            && totals
                .iter()
                .all(|(name, n)| capacity.get(name).map(|c| n <= c).unwrap_or(false))
    });

    (waitlist, removals)
}

/// Apply [`plan_overflow`] to the stored roster inside the caller's transaction.
///
/// Idempotent: a second call without intervening changes does nothing.
pub async fn enforce(conn: &mut SqliteConnection, event: &Event, now: i64) -> AppResult<EnforceReport> {
    let roles = RoleRepository::list(&mut *conn, event.id).await?;
    let signups = SignupRepository::list(&mut *conn, event.id).await?;
    let (to_waitlist, to_remove) = plan_overflow(&roles, &signups, event.max_participants);

    let mut report = EnforceReport::default();

    for idx in to_remove {
        let signup = &signups[idx];
        SignupRepository::delete(&mut *conn, event.id, signup.user_id).await?;
        AttendanceRepository::record(
            &mut *conn,
            event.group_id,
            event.id,
            signup.user_id,
            &signup.role_name,
            AttendanceStatus::Removed,
            now,
        )
        .await?;
        report.removed.push((signup.user_id, signup.role_name.clone()));
    }

    for idx in to_waitlist {
        let signup = &signups[idx];
        SignupRepository::delete(&mut *conn, event.id, signup.user_id).await?;
        WaitlistRepository::upsert(
            &mut *conn,
            event.id,
            signup.user_id,
            &signup.role_name,
            signup.created_at,
        )
        .await?;
        AttendanceRepository::record(
            &mut *conn,
            event.group_id,
            event.id,
            signup.user_id,
            &signup.role_name,
            AttendanceStatus::Waitlist,
            now,
        )
        .await?;
        report.waitlisted.push((signup.user_id, signup.role_name.clone()));
    }

    if !report.is_empty() {
        tracing::info!(
            "Event {}: capacity enforcement waitlisted {} and removed {} signups",
            event.id,
            report.waitlisted.len(),
            report.removed.len()
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{EventUpdate, NewEvent, RoleSpec};
    use crate::db::{test_store, EventRepository};

    fn role(name: &str, capacity: i64) -> Role {
        Role {
            event_id: 1,
            name: name.to_string(),
            capacity,
            position: 0,
        }
    }

    fn signup(user_id: i64, role: &str, created_at: i64) -> Signup {
        Signup {
            id: user_id,
            event_id: 1,
            user_id,
            role_name: role.to_string(),
            created_at,
        }
    }

    #[test]
    fn per_role_overflow_keeps_earliest() {
        let roles = vec![role("tank", 1), role("healer", 1)];
        let signups = vec![signup(1, "tank", 10), signup(2, "tank", 20), signup(3, "healer", 30)];
        let (waitlist, removed) = plan_overflow(&roles, &signups, 2);
        assert_eq!(waitlist, vec![1]);
        assert!(removed.is_empty());
    }

    #[test]
    fn total_overflow_drops_latest_joiners() {
        let roles = vec![role("dps", 10)];
        let signups = vec![signup(1, "dps", 1), signup(2, "dps", 2), signup(3, "dps", 3)];
        let (waitlist, removed) = plan_overflow(&roles, &signups, 1);
        assert_eq!(waitlist, vec![1, 2]);
        assert!(removed.is_empty());
    }

    #[test]
    fn vanished_and_disabled_roles_are_removed() {
        let roles = vec![role("tank", 1), role("bench", 0)];
        let signups = vec![signup(1, "healer", 1), signup(2, "bench", 2), signup(3, "tank", 3)];
        let (waitlist, removed) = plan_overflow(&roles, &signups, 5);
        assert!(waitlist.is_empty());
        assert_eq!(removed, vec![0, 1]);
    }

    #[test]
    fn within_limits_plans_nothing() {
        let roles = vec![role("tank", 2)];
        let signups = vec![signup(1, "tank", 1), signup(2, "tank", 2)];
        assert_eq!(plan_overflow(&roles, &signups, 2), (vec![], vec![]));
    }

    async fn seeded_event(conn: &mut SqliteConnection, max: i64, roles: Vec<RoleSpec>) -> Event {
        EventRepository::create(
            conn,
            &NewEvent {
                group_id: 1,
                channel_id: 2,
                name: "Raid".to_string(),
                starts_at: 0,
                comment: String::new(),
                max_participants: max,
                created_by: 100,
                roles,
                reminder_offsets: vec![],
            },
            0,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn enforce_moves_overflow_and_is_idempotent() {
        let store = test_store().await;
        let mut tx = store.begin().await.unwrap();
        let conn = tx.conn();

        let event = seeded_event(conn, 3, vec![RoleSpec::new("tank", 2), RoleSpec::new("healer", 2)]).await;
        for (user, role, at) in [(1, "tank", 1), (2, "tank", 2), (3, "healer", 3)] {
            SignupRepository::insert(conn, event.id, user, role, at).await.unwrap();
        }

        RoleRepository::replace(conn, event.id, &[RoleSpec::new("tank", 1), RoleSpec::new("healer", 2)])
            .await
            .unwrap();
        let event = EventRepository::update(
            conn,
            event.id,
            &EventUpdate {
                max_participants: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

        let report = enforce(conn, &event, 50).await.unwrap();
        assert_eq!(
            report.waitlisted,
            vec![(2, "tank".to_string()), (3, "healer".to_string())]
        );
        assert!(report.removed.is_empty());

        let remaining = SignupRepository::list(conn, event.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, 1);

        // Displaced users keep their original join time on the waitlist.
        let waitlist = WaitlistRepository::list(conn, event.id).await.unwrap();
        assert_eq!(
            waitlist.iter().map(|w| (w.user_id, w.created_at)).collect::<Vec<_>>(),
            vec![(2, 2), (3, 3)]
        );

        let again = enforce(conn, &event, 60).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(AttendanceRepository::list_for_event(conn, event.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn enforce_removes_signups_of_dropped_role() {
        let store = test_store().await;
        let mut tx = store.begin().await.unwrap();
        let conn = tx.conn();

        let event = seeded_event(conn, 2, vec![RoleSpec::new("tank", 1), RoleSpec::new("healer", 1)]).await;
        SignupRepository::insert(conn, event.id, 1, "tank", 1).await.unwrap();
        SignupRepository::insert(conn, event.id, 3, "healer", 2).await.unwrap();

        RoleRepository::replace(conn, event.id, &[RoleSpec::new("tank", 1), RoleSpec::new("dps", 1)])
            .await
            .unwrap();
        let report = enforce(conn, &event, 10).await.unwrap();

        assert_eq!(report.removed, vec![(3, "healer".to_string())]);
        assert!(WaitlistRepository::find(conn, event.id, 3).await.unwrap().is_none());
        let last = AttendanceRepository::latest(conn, event.id, 3).await.unwrap().unwrap();
        assert_eq!(last.status, "removed");
        assert_eq!(last.role_name, "healer");
    }
}
