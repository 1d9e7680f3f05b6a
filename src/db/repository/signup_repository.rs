use sqlx::SqliteConnection;

use crate::db::models::Signup;
use crate::error::{AppError, AppResult};

pub struct SignupRepository;

impl SignupRepository {
    /// Signups in FIFO order (join timestamp, then insertion order).
    pub async fn list(conn: &mut SqliteConnection, event_id: i64) -> AppResult<Vec<Signup>> {
        sqlx::query_as::<_, Signup>(
            "SELECT * FROM event_signups WHERE event_id = ? ORDER BY created_at ASC, id ASC",
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
    ) -> AppResult<Option<Signup>> {
        sqlx::query_as::<_, Signup>("SELECT * FROM event_signups WHERE event_id = ? AND user_id = ?")
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(conn)
            .await
            .map_err(AppError::Database)
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        event_id: i64,
        user_id: i64,
        role_name: &str,
        created_at: i64,
    ) -> AppResult<Signup> {
        sqlx::query_as::<_, Signup>(
            r#"
            INSERT INTO event_signups (event_id, user_id, role_name, created_at)
            VALUES (?, ?, ?, ?)
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

    /// Change role in place; the join timestamp is kept.
    pub async fn update_role(
        conn: &mut SqliteConnection,
        event_id: i64,
        user_id: i64,
        role_name: &str,
    ) -> AppResult<()> {
        sqlx::query("UPDATE event_signups SET role_name = ? WHERE event_id = ? AND user_id = ?")
            .bind(role_name)
            .bind(event_id)
            .bind(user_id)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn delete(conn: &mut SqliteConnection, event_id: i64, user_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM event_signups WHERE event_id = ? AND user_id = ?")
            .bind(event_id)
            .bind(user_id)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
