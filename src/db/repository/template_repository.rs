use sqlx::SqliteConnection;

use crate::db::models::{encode_offsets, encode_roles, NewTemplate, Template};
use crate::error::{AppError, AppResult};

pub struct TemplateRepository;

impl TemplateRepository {
    /// Insert or overwrite the template with the same (group, name).
    pub async fn upsert(
        conn: &mut SqliteConnection,
        template: &NewTemplate,
        now: i64,
    ) -> AppResult<Template> {
        sqlx::query_as::<_, Template>(
            r#"
            INSERT INTO event_templates (
                group_id,
                name,
                max_participants,
                roles_json,
                comment,
                reminder_offsets,
                created_by,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(group_id, name) DO UPDATE SET
                max_participants = excluded.max_participants,
                roles_json = excluded.roles_json,
                comment = excluded.comment,
                reminder_offsets = excluded.reminder_offsets,
                created_by = excluded.created_by
            RETURNING *
            "#,
        )
        .bind(template.group_id)
        .bind(&template.name)
        .bind(template.max_participants)
        .bind(encode_roles(&template.roles))
        .bind(&template.comment)
        .bind(encode_offsets(&template.reminder_offsets))
        .bind(template.created_by)
        .bind(now)
        .fetch_one(conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_name(
        conn: &mut SqliteConnection,
        group_id: i64,
        name: &str,
    ) -> AppResult<Option<Template>> {
        sqlx::query_as::<_, Template>("SELECT * FROM event_templates WHERE group_id = ? AND name = ?")
            .bind(group_id)
            .bind(name)
            .fetch_optional(conn)
            .await
            .map_err(AppError::Database)
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> AppResult<Option<Template>> {
        sqlx::query_as::<_, Template>("SELECT * FROM event_templates WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(AppError::Database)
    }

    pub async fn list(conn: &mut SqliteConnection, group_id: i64) -> AppResult<Vec<Template>> {
        sqlx::query_as::<_, Template>(
            "SELECT * FROM event_templates WHERE group_id = ? ORDER BY name ASC",
        )
        .bind(group_id)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn delete(conn: &mut SqliteConnection, group_id: i64, name: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM event_templates WHERE group_id = ? AND name = ?")
            .bind(group_id)
            .bind(name)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
