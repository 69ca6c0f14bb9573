use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;

use crate::domain::quota::{Plan, UserQuota};
use crate::errors::Result;

pub async fn get_user_quota(pool: &SqlitePool, user_id: &str, plan: Plan) -> Result<UserQuota> {
    let today = Utc::now().date_naive();
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT daily_used FROM usage_daily WHERE user_id = ? AND date = ?",
    )
    .bind(user_id)
    .bind(today.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(UserQuota { user_id: user_id.to_string(), plan: plan.as_str().to_string(), date: today, daily_used: row.map(|r| r.0).unwrap_or(0) })
}

/// Atomic upsert-increment scoped to today's date (spec §9 Open
/// Question 3 / §4.11 quota policy): two concurrent first-calls-of-the-day
/// each insert/increment their own row without a separate read, so the
/// unique index on `(user_id, date)` prevents any double count.
pub async fn increment_usage(pool: &SqlitePool, user_id: &str, plan: Plan) -> Result<i64> {
    let today: NaiveDate = Utc::now().date_naive();
    sqlx::query(
        r#"
        INSERT INTO usage_daily (user_id, date, plan, daily_used)
        VALUES (?, ?, ?, 1)
        ON CONFLICT(user_id, date) DO UPDATE SET daily_used = daily_used + 1
        "#,
    )
    .bind(user_id)
    .bind(today.to_string())
    .bind(plan.as_str())
    .execute(pool)
    .await?;

    let row: (i64,) = sqlx::query_as("SELECT daily_used FROM usage_daily WHERE user_id = ? AND date = ?")
        .bind(user_id)
        .bind(today.to_string())
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Display-only read; never used to decide the increment itself (spec
/// §9 Open Question 3 — "the latest row read becomes a plain SELECT
/// used only for display").
pub async fn reset_daily_if_new_day(pool: &SqlitePool, user_id: &str) -> Result<i64> {
    let today = Utc::now().date_naive();
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT daily_used FROM usage_daily WHERE user_id = ? AND date = ?",
    )
    .bind(user_id)
    .bind(today.to_string())
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.0).unwrap_or(0))
}
