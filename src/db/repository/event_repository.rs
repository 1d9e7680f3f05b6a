use sqlx::SqliteConnection;

use crate::db::models::{encode_offsets, Event, EventUpdate, NewEvent};
use crate::error::{AppError, AppResult};

use super::RoleRepository;

pub struct EventRepository;

impl EventRepository {
    /// Insert the event row and its role set. Run inside a transaction so the
    /// event never exists without its roles.
    pub async fn create(conn: &mut SqliteConnection, event: &NewEvent, now: i64) -> AppResult<Event> {
        let created = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (
                group_id,
                channel_id,
                message_id,
                name,
                starts_at,
                comment,
                max_participants,
                created_by,
                created_at,
                reminder_offsets
            ) VALUES (?, ?, NULL, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(event.group_id)
        .bind(event.channel_id)
        .bind(&event.name)
        .bind(event.starts_at)
        .bind(&event.comment)
        .bind(event.max_participants)
        .bind(event.created_by)
        .bind(now)
        .bind(encode_offsets(&event.reminder_offsets))
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        RoleRepository::replace(conn, created.id, &event.roles).await?;

        Ok(created)
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> AppResult<Option<Event>> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(AppError::Database)
    }

    /// Apply a partial update and return the resulting row.
    pub async fn update(
        conn: &mut SqliteConnection,
        id: i64,
        update: &EventUpdate,
    ) -> AppResult<Option<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            UPDATE events SET
                name = COALESCE(?, name),
                starts_at = COALESCE(?, starts_at),
                comment = COALESCE(?, comment),
                max_participants = COALESCE(?, max_participants),
                reminder_offsets = COALESCE(?, reminder_offsets)
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(update.name.as_deref())
        .bind(update.starts_at)
        .bind(update.comment.as_deref())
        .bind(update.max_participants)
        .bind(update.reminder_offsets.as_deref().map(encode_offsets))
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn set_reminder_offsets(
        conn: &mut SqliteConnection,
        id: i64,
        offsets: &[i64],
    ) -> AppResult<()> {
        sqlx::query("UPDATE events SET reminder_offsets = ? WHERE id = ?")
            .bind(encode_offsets(offsets))
            .bind(id)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn set_message_id(
        conn: &mut SqliteConnection,
        id: i64,
        message_id: Option<i64>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE events SET message_id = ? WHERE id = ?")
            .bind(message_id)
            .bind(id)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    /// Delete the event; roles, signups, waitlist and reminders cascade.
    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Unscheduled events first, then by start time.
    pub async fn list_upcoming(
        conn: &mut SqliteConnection,
        group_id: i64,
        now: i64,
        limit: i64,
    ) -> AppResult<Vec<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT * FROM events
            WHERE group_id = ? AND (starts_at = 0 OR starts_at >= ?)
            ORDER BY CASE WHEN starts_at = 0 THEN 0 ELSE 1 END, starts_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(group_id)
        .bind(now)
        .bind(limit)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)
    }

    /// Events that still have a live roster post: a message id and a start
    /// that is unset or not yet reached.
    pub async fn list_open_posted(conn: &mut SqliteConnection, now: i64) -> AppResult<Vec<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT * FROM events
            WHERE message_id IS NOT NULL AND (starts_at = 0 OR starts_at >= ?)
            ORDER BY id ASC
            "#,
        )
        .bind(now)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)
    }
}
