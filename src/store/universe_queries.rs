use sqlx::SqlitePool;

use crate::domain::asset::{Asset, AssetId};
use crate::domain::scope::MarketScope;
use crate::errors::Result;

pub async fn upsert_asset(pool: &SqlitePool, asset: &Asset) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO universe (
            asset_id, symbol, name, asset_type, market_scope, market_code,
            exchange_code, currency, country, sector, industry, tier,
            priority_level, active, created_at, updated_at
        ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
        ON CONFLICT(asset_id) DO UPDATE SET
            symbol = excluded.symbol,
            name = excluded.name,
            asset_type = excluded.asset_type,
            market_scope = excluded.market_scope,
            market_code = excluded.market_code,
            exchange_code = excluded.exchange_code,
            currency = excluded.currency,
            country = excluded.country,
            sector = excluded.sector,
            industry = excluded.industry,
            tier = excluded.tier,
            priority_level = excluded.priority_level,
            active = excluded.active,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&asset.asset_id)
    .bind(&asset.symbol)
    .bind(&asset.name)
    .bind(&asset.asset_type)
    .bind(&asset.market_scope)
    .bind(&asset.market_code)
    .bind(&asset.exchange_code)
    .bind(&asset.currency)
    .bind(&asset.country)
    .bind(&asset.sector)
    .bind(&asset.industry)
    .bind(asset.tier)
    .bind(asset.priority_level)
    .bind(asset.active)
    .bind(asset.created_at.to_rfc3339())
    .bind(asset.updated_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn bulk_upsert_assets(pool: &SqlitePool, assets: &[Asset]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for asset in assets {
        sqlx::query(
            r#"
            INSERT INTO universe (
                asset_id, symbol, name, asset_type, market_scope, market_code,
                exchange_code, currency, country, sector, industry, tier,
                priority_level, active, created_at, updated_at
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT(asset_id) DO UPDATE SET
                symbol = excluded.symbol,
                name = excluded.name,
                asset_type = excluded.asset_type,
                market_scope = excluded.market_scope,
                market_code = excluded.market_code,
                exchange_code = excluded.exchange_code,
                currency = excluded.currency,
                country = excluded.country,
                sector = excluded.sector,
                industry = excluded.industry,
                tier = excluded.tier,
                priority_level = excluded.priority_level,
                active = excluded.active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&asset.asset_id)
        .bind(&asset.symbol)
        .bind(&asset.name)
        .bind(&asset.asset_type)
        .bind(&asset.market_scope)
        .bind(&asset.market_code)
        .bind(&asset.exchange_code)
        .bind(&asset.currency)
        .bind(&asset.country)
        .bind(&asset.sector)
        .bind(&asset.industry)
        .bind(asset.tier)
        .bind(asset.priority_level)
        .bind(asset.active)
        .bind(asset.created_at.to_rfc3339())
        .bind(asset.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn get_asset(pool: &SqlitePool, asset_id: &AssetId) -> Result<Option<Asset>> {
    let asset = sqlx::query_as::<_, Asset>("SELECT * FROM universe WHERE asset_id = ?")
        .bind(asset_id)
        .fetch_optional(pool)
        .await?;
    Ok(asset)
}

pub async fn get_active_assets(pool: &SqlitePool, scope: MarketScope) -> Result<Vec<Asset>> {
    let assets = sqlx::query_as::<_, Asset>(
        "SELECT * FROM universe WHERE market_scope = ? AND active = 1 ORDER BY tier ASC, asset_id ASC",
    )
    .bind(scope.as_str())
    .fetch_all(pool)
    .await?;
    Ok(assets)
}

pub async fn get_eligible_assets(pool: &SqlitePool, scope: MarketScope) -> Result<Vec<Asset>> {
    let assets = sqlx::query_as::<_, Asset>(
        r#"
        SELECT u.* FROM universe u
        JOIN gating_status g ON g.asset_id = u.asset_id
        WHERE u.market_scope = ? AND g.eligible = 1
        ORDER BY u.tier ASC, u.asset_id ASC
        "#,
    )
    .bind(scope.as_str())
    .fetch_all(pool)
    .await?;
    Ok(assets)
}

pub async fn get_priority_assets(pool: &SqlitePool, limit: i64, scope: MarketScope) -> Result<Vec<Asset>> {
    let assets = sqlx::query_as::<_, Asset>(
        r#"
        SELECT * FROM universe
        WHERE market_scope = ? AND active = 1
        ORDER BY priority_level DESC, tier ASC, asset_id ASC
        LIMIT ?
        "#,
    )
    .bind(scope.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(assets)
}

/// Tier-1 active assets for this scope (spec §4.9 step 2).
pub async fn get_tier1_assets(pool: &SqlitePool, scope: MarketScope) -> Result<Vec<Asset>> {
    let assets = sqlx::query_as::<_, Asset>(
        "SELECT * FROM universe WHERE market_scope = ? AND active = 1 AND tier = 1 ORDER BY asset_id ASC",
    )
    .bind(scope.as_str())
    .fetch_all(pool)
    .await?;
    Ok(assets)
}

/// Tier-2 assets ordered oldest-refreshed-first, NULLs (never
/// refreshed) sorting ahead of any timestamp (spec §4.9 step 4).
pub async fn get_tier2_assets_by_staleness(
    pool: &SqlitePool,
    scope: MarketScope,
    limit: i64,
) -> Result<Vec<Asset>> {
    let assets = sqlx::query_as::<_, Asset>(
        r#"
        SELECT u.* FROM universe u
        LEFT JOIN rotation_state r ON r.asset_id = u.asset_id
        WHERE u.market_scope = ? AND u.active = 1 AND u.tier = 2
        ORDER BY r.last_refresh_at IS NOT NULL, r.last_refresh_at ASC, u.asset_id ASC
        LIMIT ?
        "#,
    )
    .bind(scope.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(assets)
}
