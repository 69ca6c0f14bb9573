use sqlx::SqlitePool;

use crate::domain::gating::GatingStatus;
use crate::errors::Result;

pub async fn upsert_gating(pool: &SqlitePool, status: &GatingStatus) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO gating_status (
            asset_id, market_scope, coverage, liquidity, price_min, stale_ratio,
            zero_volume_ratio, eligible, reason, data_confidence, fx_risk,
            liquidity_risk, last_bar_date, updated_at
        ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?)
        ON CONFLICT(asset_id) DO UPDATE SET
            market_scope = excluded.market_scope,
            coverage = excluded.coverage,
            liquidity = excluded.liquidity,
            price_min = excluded.price_min,
            stale_ratio = excluded.stale_ratio,
            zero_volume_ratio = excluded.zero_volume_ratio,
            eligible = excluded.eligible,
            reason = excluded.reason,
            data_confidence = excluded.data_confidence,
            fx_risk = excluded.fx_risk,
            liquidity_risk = excluded.liquidity_risk,
            last_bar_date = excluded.last_bar_date,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&status.asset_id)
    .bind(&status.market_scope)
    .bind(status.coverage)
    .bind(status.liquidity)
    .bind(status.price_min)
    .bind(status.stale_ratio)
    .bind(status.zero_volume_ratio)
    .bind(status.eligible)
    .bind(&status.reason)
    .bind(status.data_confidence)
    .bind(status.fx_risk)
    .bind(status.liquidity_risk)
    .bind(status.last_bar_date)
    .bind(status.updated_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_gating(pool: &SqlitePool, asset_id: &str) -> Result<Option<GatingStatus>> {
    let status = sqlx::query_as::<_, GatingStatus>("SELECT * FROM gating_status WHERE asset_id = ?")
        .bind(asset_id)
        .fetch_optional(pool)
        .await?;
    Ok(status)
}

pub async fn insert_staging_gating(pool: &SqlitePool, run_id: &str, status: &GatingStatus) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO gating_staging (
            run_id, asset_id, market_scope, coverage, liquidity, price_min, stale_ratio,
            zero_volume_ratio, eligible, reason, data_confidence, fx_risk,
            liquidity_risk, last_bar_date, updated_at
        ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
        ON CONFLICT(run_id, asset_id) DO UPDATE SET
            coverage = excluded.coverage,
            liquidity = excluded.liquidity,
            price_min = excluded.price_min,
            stale_ratio = excluded.stale_ratio,
            zero_volume_ratio = excluded.zero_volume_ratio,
            eligible = excluded.eligible,
            reason = excluded.reason,
            data_confidence = excluded.data_confidence,
            fx_risk = excluded.fx_risk,
            liquidity_risk = excluded.liquidity_risk,
            last_bar_date = excluded.last_bar_date,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(run_id)
    .bind(&status.asset_id)
    .bind(&status.market_scope)
    .bind(status.coverage)
    .bind(status.liquidity)
    .bind(status.price_min)
    .bind(status.stale_ratio)
    .bind(status.zero_volume_ratio)
    .bind(status.eligible)
    .bind(&status.reason)
    .bind(status.data_confidence)
    .bind(status.fx_risk)
    .bind(status.liquidity_risk)
    .bind(status.last_bar_date)
    .bind(status.updated_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_staging_gating(executor: &mut sqlx::SqliteConnection, run_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM gating_staging WHERE run_id = ?")
        .bind(run_id)
        .execute(executor)
        .await?;
    Ok(())
}
