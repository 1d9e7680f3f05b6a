use sqlx::SqliteConnection;

use crate::db::models::WaitlistEntry;
use crate::error::{AppError, AppResult};

pub struct WaitlistRepository;

impl WaitlistRepository {
    /// Entries in promotion order (entry timestamp, then insertion order).
    pub async fn list(conn: &mut SqliteConnection, event_id: i64) -> AppResult<Vec<WaitlistEntry>> {
        sqlx::query_as::<_, WaitlistEntry>(
            "SELECT * FROM event_waitlist WHERE event_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(event_id)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find(
        conn: &mut SqliteConnection,
        event_id: i64,
        user_id: i64,
    ) -> AppResult<Option<WaitlistEntry>> {
        sqlx::query_as::<_, WaitlistEntry>(
            "SELECT * FROM event_waitlist WHERE event_id = ? AND user_id = ?",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await
        .map_err(AppError::Database)
    }

    /// Insert or merge an entry. On merge the role is replaced and the
    /// earliest timestamp wins.
    pub async fn upsert(
        conn: &mut SqliteConnection,
        event_id: i64,
        user_id: i64,
        role_name: &str,
        created_at: i64,
    ) -> AppResult<WaitlistEntry> {
        sqlx::query_as::<_, WaitlistEntry>(
            r#"
            INSERT INTO event_waitlist (event_id, user_id, role_name, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(event_id, user_id) DO UPDATE SET
                role_name = excluded.role_name,
                created_at = MIN(event_waitlist.created_at, excluded.created_at)
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(role_name)
        .bind(created_at)
        .fetch_one(conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn delete(conn: &mut SqliteConnection, event_id: i64, user_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM event_waitlist WHERE event_id = ? AND user_id = ?")
            .bind(event_id)
            .bind(user_id)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
