use sqlx::SqliteConnection;

use crate::db::models::{encode_offsets, encode_roles, generate_at_for, NewSchedule, Schedule};
use crate::error::{AppError, AppResult};

pub struct ScheduleRepository;

impl ScheduleRepository {
    pub async fn create(
        conn: &mut SqliteConnection,
        schedule: &NewSchedule,
        now: i64,
    ) -> AppResult<Schedule> {
        sqlx::query_as::<_, Schedule>(
            r#"
            INSERT INTO event_schedules (
                group_id,
                channel_id,
                template_id,
                name_pattern,
                comment,
                max_participants,
                roles_json,
                weekday,
                time_of_day,
                interval_days,
                lead_time_hours,
                reminder_offsets,
                next_run_at,
                generate_at,
                created_by,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(schedule.group_id)
        .bind(schedule.channel_id)
        .bind(schedule.template_id)
        .bind(&schedule.name_pattern)
        .bind(&schedule.comment)
        .bind(schedule.max_participants)
        .bind(encode_roles(&schedule.roles))
        .bind(schedule.weekday)
        .bind(&schedule.time_of_day)
        .bind(schedule.interval_days)
        .bind(schedule.lead_time_hours)
        .bind(encode_offsets(&schedule.reminder_offsets))
        .bind(schedule.next_run_at)
        .bind(generate_at_for(schedule.next_run_at, schedule.lead_time_hours))
        .bind(schedule.created_by)
        .bind(now)
        .fetch_one(conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find(
        conn: &mut SqliteConnection,
        group_id: i64,
        id: i64,
    ) -> AppResult<Option<Schedule>> {
        sqlx::query_as::<_, Schedule>("SELECT * FROM event_schedules WHERE group_id = ? AND id = ?")
            .bind(group_id)
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(AppError::Database)
    }

    pub async fn list(conn: &mut SqliteConnection, group_id: i64) -> AppResult<Vec<Schedule>> {
        sqlx::query_as::<_, Schedule>(
            "SELECT * FROM event_schedules WHERE group_id = ? ORDER BY next_run_at ASC, id ASC",
        )
        .bind(group_id)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn list_due(conn: &mut SqliteConnection, now: i64) -> AppResult<Vec<Schedule>> {
        sqlx::query_as::<_, Schedule>(
            "SELECT * FROM event_schedules WHERE generate_at <= ? ORDER BY generate_at ASC, id ASC",
        )
        .bind(now)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)
    }

    /// Move the schedule to its next occurrence, recomputing `generate_at`.
    pub async fn advance(
        conn: &mut SqliteConnection,
        id: i64,
        next_run_at: i64,
        lead_time_hours: i64,
    ) -> AppResult<()> {
        sqlx::query("UPDATE event_schedules SET next_run_at = ?, generate_at = ? WHERE id = ?")
            .bind(next_run_at)
            .bind(generate_at_for(next_run_at, lead_time_hours))
            .bind(id)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM event_schedules WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
