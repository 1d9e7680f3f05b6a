use sqlx::SqliteConnection;

use crate::db::models::Reminder;
use crate::error::{AppError, AppResult};

pub struct ReminderRepository;

impl ReminderRepository {
    pub async fn delete_for_event(conn: &mut SqliteConnection, event_id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM event_reminders WHERE event_id = ?")
            .bind(event_id)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        event_id: i64,
        offset_seconds: i64,
        remind_at: i64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO event_reminders (event_id, offset_seconds, remind_at, sent)
            VALUES (?, ?, ?, 0)
            ON CONFLICT(event_id, offset_seconds) DO UPDATE SET
                remind_at = excluded.remind_at,
                sent = 0
            "#,
        )
        .bind(event_id)
        .bind(offset_seconds)
        .bind(remind_at)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn list_for_event(conn: &mut SqliteConnection, event_id: i64) -> AppResult<Vec<Reminder>> {
        sqlx::query_as::<_, Reminder>(
            "SELECT * FROM event_reminders WHERE event_id = ? ORDER BY remind_at ASC",
        )
        .bind(event_id)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)
    }

    /// Unsent reminders whose fire time has passed, oldest first.
    pub async fn list_due(conn: &mut SqliteConnection, now: i64) -> AppResult<Vec<Reminder>> {
        sqlx::query_as::<_, Reminder>(
            r#"
            SELECT * FROM event_reminders
            WHERE sent = 0 AND remind_at <= ?
            ORDER BY remind_at ASC, event_id ASC
            "#,
        )
        .bind(now)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn mark_sent(
        conn: &mut SqliteConnection,
        event_id: i64,
        offset_seconds: i64,
    ) -> AppResult<()> {
        sqlx::query("UPDATE event_reminders SET sent = 1 WHERE event_id = ? AND offset_seconds = ?")
            .bind(event_id)
            .bind(offset_seconds)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}
