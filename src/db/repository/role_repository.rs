use sqlx::SqliteConnection;

use crate::db::models::{Role, RoleSpec};
use crate::error::{AppError, AppResult};

pub struct RoleRepository;

impl RoleRepository {
    /// Roles in the order they were declared.
    pub async fn list(conn: &mut SqliteConnection, event_id: i64) -> AppResult<Vec<Role>> {
        sqlx::query_as::<_, Role>(
            "SELECT * FROM event_roles WHERE event_id = ? ORDER BY position ASC, name ASC",
        )
        .bind(event_id)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find(
        conn: &mut SqliteConnection,
        event_id: i64,
        name: &str,
    ) -> AppResult<Option<Role>> {
        sqlx::query_as::<_, Role>("SELECT * FROM event_roles WHERE event_id = ? AND name = ?")
            .bind(event_id)
            .bind(name)
            .fetch_optional(conn)
            .await
            .map_err(AppError::Database)
    }

    /// Swap the whole role set. Signups and waitlist entries are untouched;
    /// callers reconcile them afterwards.
    pub async fn replace(
        conn: &mut SqliteConnection,
        event_id: i64,
        roles: &[RoleSpec],
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM event_roles WHERE event_id = ?")
            .bind(event_id)
            .execute(&mut *conn)
            .await
            .map_err(AppError::Database)?;

        for (position, role) in roles.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO event_roles (event_id, name, capacity, position)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(event_id, name) DO UPDATE SET
                    capacity = excluded.capacity,
                    position = excluded.position
                "#,
            )
            .bind(event_id)
            .bind(&role.name)
            .bind(role.capacity)
            .bind(position as i64)
            .execute(&mut *conn)
            .await
            .map_err(AppError::Database)?;
        }

        Ok(())
    }
}
