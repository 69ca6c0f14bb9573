use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::domain::job::{QueueItem, QueueStatus};
use crate::domain::scope::MarketScope;
use crate::errors::Result;

#[derive(Debug, FromRow)]
struct QueueItemRow {
    id: String,
    job_type: String,
    market_scope: Option<String>,
    payload: String,
    status: String,
    requested_by: String,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    error: Option<String>,
}

impl TryFrom<QueueItemRow> for QueueItem {
    type Error = crate::errors::AppError;

    fn try_from(row: QueueItemRow) -> Result<Self> {
        let payload: serde_json::Value = serde_json::from_str(&row.payload)
            .map_err(|e| crate::errors::AppError::Internal(format!("corrupt queue payload: {e}")))?;
        Ok(QueueItem {
            id: row.id,
            job_type: row.job_type,
            market_scope: row.market_scope,
            payload,
            status: row.status,
            requested_by: row.requested_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            error: row.error,
        })
    }
}

pub async fn enqueue_job(
    pool: &SqlitePool,
    job_type: &str,
    scope: Option<MarketScope>,
    payload: serde_json::Value,
    requested_by: &str,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let payload_str = serde_json::to_string(&payload)
        .map_err(|e| crate::errors::AppError::Internal(format!("failed to serialize payload: {e}")))?;
    sqlx::query(
        r#"
        INSERT INTO job_queue (id, job_type, market_scope, payload, status, requested_by, created_at, updated_at, error)
        VALUES (?,?,?,?,?,?,?,?,NULL)
        "#,
    )
    .bind(&id)
    .bind(job_type)
    .bind(scope.map(|s| s.as_str().to_string()))
    .bind(payload_str)
    .bind(QueueStatus::Pending.as_str())
    .bind(requested_by)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(id)
}

/// Claims exactly one PENDING row and transitions it to PROCESSING in
/// a single serialized transaction (spec §4.1 `fetchNextJobAtomic`);
/// `BEGIN IMMEDIATE` takes the write lock up front so two concurrent
/// worker ticks can never claim the same row.
pub async fn fetch_next_job_atomic(pool: &SqlitePool, scope: Option<MarketScope>) -> Result<Option<QueueItem>> {
    let mut tx = pool.begin().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *tx).await.ok();

    let row = if let Some(scope) = scope {
        sqlx::query_as::<_, QueueItemRow>(
            r#"
            SELECT * FROM job_queue
            WHERE status = 'PENDING' AND (market_scope = ? OR market_scope IS NULL)
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(scope.as_str())
        .fetch_optional(&mut *tx)
        .await?
    } else {
        sqlx::query_as::<_, QueueItemRow>(
            "SELECT * FROM job_queue WHERE status = 'PENDING' ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?
    };

    let Some(row) = row else {
        tx.commit().await?;
        return Ok(None);
    };

    sqlx::query("UPDATE job_queue SET status = 'PROCESSING', updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&row.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Some(QueueItem::try_from(row)?))
}

pub async fn mark_job_done(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("UPDATE job_queue SET status = 'COMPLETED', updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_job_failed(pool: &SqlitePool, id: &str, error: &str) -> Result<()> {
    sqlx::query("UPDATE job_queue SET status = 'FAILED', error = ?, updated_at = ? WHERE id = ?")
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
