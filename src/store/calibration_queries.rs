use chrono::Utc;
use sqlx::SqlitePool;

use crate::errors::Result;

/// Reads a calibration constant, falling back to `default` if no row
/// exists yet — behavior is unchanged until an operator tunes a value
/// (spec §9 Open Question 2).
pub async fn get_param(pool: &SqlitePool, key: &str, default: f64) -> Result<f64> {
    let row: Option<(f64,)> = sqlx::query_as("SELECT value FROM calibration_params WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.0).unwrap_or(default))
}

pub async fn set_param(pool: &SqlitePool, key: &str, value: f64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO calibration_params (key, value, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}
