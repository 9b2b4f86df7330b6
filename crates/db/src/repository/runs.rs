//! Automation run repository functions.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::RunRecord};

const RUN_COLUMNS: &str =
    "id, automation_id, status, trigger_data, duration_ms, details_log, started_at, finished_at";

/// Insert the run row, or overwrite every mutable column if it exists.
pub async fn upsert_run(pool: &PgPool, record: &RunRecord) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO automation_runs
            (id, automation_id, status, trigger_data, duration_ms, details_log, started_at, finished_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO UPDATE
        SET status       = EXCLUDED.status,
            trigger_data = EXCLUDED.trigger_data,
            duration_ms  = EXCLUDED.duration_ms,
            details_log  = EXCLUDED.details_log,
            finished_at  = EXCLUDED.finished_at
        "#,
    )
    .bind(record.id)
    .bind(&record.automation_id)
    .bind(record.status)
    .bind(&record.trigger_data)
    .bind(record.duration_ms)
    .bind(&record.details_log)
    .bind(record.started_at)
    .bind(record.finished_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single run by its execution id.
pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<RunRecord, DbError> {
    let query = format!("SELECT {RUN_COLUMNS} FROM automation_runs WHERE id = $1");
    sqlx::query_as::<_, RunRecord>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Return every run of one automation, newest first.
pub async fn list_runs_for_automation(pool: &PgPool, automation_id: &str) -> Result<Vec<RunRecord>, DbError> {
    let query = format!(
        "SELECT {RUN_COLUMNS} FROM automation_runs WHERE automation_id = $1 ORDER BY started_at DESC"
    );
    let rows = sqlx::query_as::<_, RunRecord>(&query)
        .bind(automation_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
