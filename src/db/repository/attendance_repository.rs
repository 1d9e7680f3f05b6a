use sqlx::SqliteConnection;

use crate::db::models::{AttendanceCount, AttendanceHistoryRow, AttendanceRecord, AttendanceStatus};
use crate::error::{AppError, AppResult};

/// Append-only attendance log.
pub struct AttendanceRepository;

impl AttendanceRepository {
    pub async fn latest(
        conn: &mut SqliteConnection,
        event_id: i64,
        user_id: i64,
    ) -> AppResult<Option<AttendanceRecord>> {
        sqlx::query_as::<_, AttendanceRecord>(
            r#"
            SELECT * FROM attendance_log
            WHERE event_id = ? AND user_id = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await
        .map_err(AppError::Database)
    }

    /// Append a record unless it repeats the latest (role, status) for the
    /// same (event, user). Returns whether a row was written.
    pub async fn record(
        conn: &mut SqliteConnection,
        group_id: i64,
        event_id: i64,
        user_id: i64,
        role_name: &str,
        status: AttendanceStatus,
        recorded_at: i64,
    ) -> AppResult<bool> {
        if let Some(last) = Self::latest(&mut *conn, event_id, user_id).await? {
            if last.role_name == role_name && last.status == status.as_str() {
                return Ok(false);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO attendance_log (group_id, event_id, user_id, role_name, status, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(group_id)
        .bind(event_id)
        .bind(user_id)
        .bind(role_name)
        .bind(status.as_str())
        .bind(recorded_at)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(true)
    }

    pub async fn list_for_event(
        conn: &mut SqliteConnection,
        event_id: i64,
    ) -> AppResult<Vec<AttendanceRecord>> {
        sqlx::query_as::<_, AttendanceRecord>(
            "SELECT * FROM attendance_log WHERE event_id = ? ORDER BY id ASC",
        )
        .bind(event_id)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)
    }

    /// Counts per (user, role) over events whose latest record for the user is `main`.
    pub async fn count_attended(
        conn: &mut SqliteConnection,
        group_id: i64,
    ) -> AppResult<Vec<AttendanceCount>> {
        sqlx::query_as::<_, AttendanceCount>(
            r#"
            SELECT a.user_id AS user_id, a.role_name AS role_name, COUNT(*) AS attended
            FROM attendance_log a
            JOIN (
                SELECT MAX(id) AS last_id
                FROM attendance_log
                WHERE group_id = ?
                GROUP BY event_id, user_id
            ) latest ON latest.last_id = a.id
            WHERE a.status = 'main'
            GROUP BY a.user_id, a.role_name
            "#,
        )
        .bind(group_id)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)
    }

    /// Most recent records first.
    pub async fn history(
        conn: &mut SqliteConnection,
        group_id: i64,
        user_id: i64,
        limit: i64,
    ) -> AppResult<Vec<AttendanceHistoryRow>> {
        sqlx::query_as::<_, AttendanceHistoryRow>(
            r#"
            SELECT
                a.id AS id,
                a.event_id AS event_id,
                e.name AS event_name,
                a.role_name AS role_name,
                a.status AS status,
                a.recorded_at AS recorded_at
            FROM attendance_log a
            LEFT JOIN events e ON e.id = a.event_id
            WHERE a.group_id = ? AND a.user_id = ?
            ORDER BY a.id DESC
            LIMIT ?
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)
    }
}
