use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::domain::job::{JobMode, JobRun, JobStatus, JobType};
use crate::domain::scope::MarketScope;
use crate::errors::Result;

#[derive(Debug, FromRow)]
struct JobRunRow {
    run_id: String,
    market_scope: String,
    job_type: String,
    mode: String,
    created_by: String,
    status: String,
    assets_processed: i64,
    assets_success: i64,
    assets_failed: i64,
    started_at: chrono::DateTime<Utc>,
    ended_at: Option<chrono::DateTime<Utc>>,
    error: Option<String>,
}

impl From<JobRunRow> for JobRun {
    fn from(row: JobRunRow) -> Self {
        JobRun {
            run_id: row.run_id,
            market_scope: row.market_scope,
            job_type: row.job_type,
            mode: row.mode,
            created_by: row.created_by,
            status: row.status,
            assets_processed: row.assets_processed,
            assets_success: row.assets_success,
            assets_failed: row.assets_failed,
            started_at: row.started_at,
            ended_at: row.ended_at,
            error: row.error,
        }
    }
}

pub async fn create_job_run(
    pool: &SqlitePool,
    scope: MarketScope,
    job_type: JobType,
    mode: JobMode,
    created_by: &str,
) -> Result<String> {
    let run_id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO job_runs (
            run_id, market_scope, job_type, mode, created_by, status,
            assets_processed, assets_success, assets_failed, started_at, ended_at, error
        ) VALUES (?,?,?,?,?,?,0,0,0,?,NULL,NULL)
        "#,
    )
    .bind(&run_id)
    .bind(scope.as_str())
    .bind(job_type.as_str())
    .bind(mode.as_str())
    .bind(created_by)
    .bind(JobStatus::Running.as_str())
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(run_id)
}

#[allow(clippy::too_many_arguments)]
pub async fn update_job_run_status(
    pool: &SqlitePool,
    run_id: &str,
    status: JobStatus,
    assets_processed: i64,
    assets_success: i64,
    assets_failed: i64,
    error: Option<&str>,
) -> Result<()> {
    let ended_at = if status.is_terminal() { Some(Utc::now().to_rfc3339()) } else { None };
    sqlx::query(
        r#"
        UPDATE job_runs
        SET status = ?, assets_processed = ?, assets_success = ?, assets_failed = ?,
            error = ?, ended_at = COALESCE(?, ended_at)
        WHERE run_id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(assets_processed)
    .bind(assets_success)
    .bind(assets_failed)
    .bind(error)
    .bind(ended_at)
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_job_run(pool: &SqlitePool, run_id: &str) -> Result<Option<JobRun>> {
    let row = sqlx::query_as::<_, JobRunRow>("SELECT * FROM job_runs WHERE run_id = ?")
        .bind(run_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(JobRun::from))
}

pub async fn recent_jobs(pool: &SqlitePool, limit: i64) -> Result<Vec<JobRun>> {
    let rows = sqlx::query_as::<_, JobRunRow>(
        "SELECT * FROM job_runs ORDER BY started_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(JobRun::from).collect())
}
