use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::domain::scope::MarketScope;
use crate::domain::score::{Score, ScoreBreakdown, StateLabel};
use crate::errors::{AppError, Result};

/// Raw row shape shared by `scores_latest` and `scores_staging`; the
/// breakdown is stored as a JSON TEXT column rather than a free-form
/// blob column, since sqlite has no native JSON type (spec §3 keeps
/// the breakdown a typed struct end to end, only the wire format is
/// JSON).
#[derive(Debug, FromRow)]
struct ScoreRow {
    asset_id: String,
    market_scope: String,
    score_total: Option<f64>,
    score_value: Option<f64>,
    score_momentum: Option<f64>,
    score_safety: Option<f64>,
    score_fx_risk: Option<f64>,
    score_liquidity_risk: Option<f64>,
    confidence: i32,
    state_label: String,
    rsi: Option<f64>,
    zscore: Option<f64>,
    vol_annual: Option<f64>,
    max_drawdown: Option<f64>,
    sma200: Option<f64>,
    last_price: Option<f64>,
    fundamentals_available: bool,
    breakdown: String,
    computed_at: DateTime<Utc>,
}

fn state_label_from_str(s: &str) -> StateLabel {
    match s {
        "EQUILIBRE" => StateLabel::Equilibre,
        "EXTENSION_HAUTE" => StateLabel::ExtensionHaute,
        "EXTENSION_BASSE" => StateLabel::ExtensionBasse,
        "STRESS_HAUSSIER" => StateLabel::StressHaussier,
        "STRESS_BAISSIER" => StateLabel::StressBaissier,
        _ => StateLabel::Na,
    }
}

impl TryFrom<ScoreRow> for Score {
    type Error = AppError;

    fn try_from(row: ScoreRow) -> Result<Self> {
        let breakdown: ScoreBreakdown = serde_json::from_str(&row.breakdown)
            .map_err(|e| AppError::Internal(format!("corrupt breakdown for {}: {e}", row.asset_id)))?;
        Ok(Score {
            asset_id: row.asset_id,
            market_scope: row.market_scope,
            score_total: row.score_total,
            score_value: row.score_value,
            score_momentum: row.score_momentum,
            score_safety: row.score_safety,
            score_fx_risk: row.score_fx_risk,
            score_liquidity_risk: row.score_liquidity_risk,
            confidence: row.confidence,
            state_label: state_label_from_str(&row.state_label),
            rsi: row.rsi,
            zscore: row.zscore,
            vol_annual: row.vol_annual,
            max_drawdown: row.max_drawdown,
            sma200: row.sma200,
            last_price: row.last_price,
            fundamentals_available: row.fundamentals_available,
            breakdown,
            computed_at: row.computed_at,
        })
    }
}

pub async fn upsert_score(pool: &SqlitePool, score: &Score) -> Result<()> {
    let breakdown = serde_json::to_string(&score.breakdown)
        .map_err(|e| AppError::Internal(format!("failed to serialize breakdown: {e}")))?;
    sqlx::query(
        r#"
        INSERT INTO scores_latest (
            asset_id, market_scope, score_total, score_value, score_momentum,
            score_safety, score_fx_risk, score_liquidity_risk, confidence,
            state_label, rsi, zscore, vol_annual, max_drawdown, sma200,
            last_price, fundamentals_available, breakdown, computed_at
        ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
        ON CONFLICT(asset_id) DO UPDATE SET
            market_scope = excluded.market_scope,
            score_total = excluded.score_total,
            score_value = excluded.score_value,
            score_momentum = excluded.score_momentum,
            score_safety = excluded.score_safety,
            score_fx_risk = excluded.score_fx_risk,
            score_liquidity_risk = excluded.score_liquidity_risk,
            confidence = excluded.confidence,
            state_label = excluded.state_label,
            rsi = excluded.rsi,
            zscore = excluded.zscore,
            vol_annual = excluded.vol_annual,
            max_drawdown = excluded.max_drawdown,
            sma200 = excluded.sma200,
            last_price = excluded.last_price,
            fundamentals_available = excluded.fundamentals_available,
            breakdown = excluded.breakdown,
            computed_at = excluded.computed_at
        "#,
    )
    .bind(&score.asset_id)
    .bind(&score.market_scope)
    .bind(score.score_total)
    .bind(score.score_value)
    .bind(score.score_momentum)
    .bind(score.score_safety)
    .bind(score.score_fx_risk)
    .bind(score.score_liquidity_risk)
    .bind(score.confidence)
    .bind(score.state_label.as_str())
    .bind(score.rsi)
    .bind(score.zscore)
    .bind(score.vol_annual)
    .bind(score.max_drawdown)
    .bind(score.sma200)
    .bind(score.last_price)
    .bind(score.fundamentals_available)
    .bind(breakdown)
    .bind(score.computed_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_score(pool: &SqlitePool, asset_id: &str) -> Result<Option<Score>> {
    let row = sqlx::query_as::<_, ScoreRow>("SELECT * FROM scores_latest WHERE asset_id = ?")
        .bind(asset_id)
        .fetch_optional(pool)
        .await?;
    row.map(Score::try_from).transpose()
}

pub async fn get_top_scores(pool: &SqlitePool, limit: i64, scope: MarketScope) -> Result<Vec<Score>> {
    let rows = sqlx::query_as::<_, ScoreRow>(
        r#"
        SELECT * FROM scores_latest
        WHERE market_scope = ? AND score_total IS NOT NULL
        ORDER BY score_total DESC
        LIMIT ?
        "#,
    )
    .bind(scope.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Score::try_from).collect()
}

pub async fn get_top50_asset_ids(pool: &SqlitePool, scope: MarketScope) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT asset_id FROM scores_latest
        WHERE market_scope = ? AND score_total IS NOT NULL
        ORDER BY score_total DESC
        LIMIT 50
        "#,
    )
    .bind(scope.as_str())
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn insert_staging_score(pool: &SqlitePool, run_id: &str, score: &Score) -> Result<()> {
    let breakdown = serde_json::to_string(&score.breakdown)
        .map_err(|e| AppError::Internal(format!("failed to serialize breakdown: {e}")))?;
    sqlx::query(
        r#"
        INSERT INTO scores_staging (
            run_id, asset_id, market_scope, score_total, score_value, score_momentum,
            score_safety, score_fx_risk, score_liquidity_risk, confidence,
            state_label, rsi, zscore, vol_annual, max_drawdown, sma200,
            last_price, fundamentals_available, breakdown, computed_at
        ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
        ON CONFLICT(run_id, asset_id) DO UPDATE SET
            score_total = excluded.score_total,
            score_value = excluded.score_value,
            score_momentum = excluded.score_momentum,
            score_safety = excluded.score_safety,
            score_fx_risk = excluded.score_fx_risk,
            score_liquidity_risk = excluded.score_liquidity_risk,
            confidence = excluded.confidence,
            state_label = excluded.state_label,
            rsi = excluded.rsi,
            zscore = excluded.zscore,
            vol_annual = excluded.vol_annual,
            max_drawdown = excluded.max_drawdown,
            sma200 = excluded.sma200,
            last_price = excluded.last_price,
            fundamentals_available = excluded.fundamentals_available,
            breakdown = excluded.breakdown,
            computed_at = excluded.computed_at
        "#,
    )
    .bind(run_id)
    .bind(&score.asset_id)
    .bind(&score.market_scope)
    .bind(score.score_total)
    .bind(score.score_value)
    .bind(score.score_momentum)
    .bind(score.score_safety)
    .bind(score.score_fx_risk)
    .bind(score.score_liquidity_risk)
    .bind(score.confidence)
    .bind(score.state_label.as_str())
    .bind(score.rsi)
    .bind(score.zscore)
    .bind(score.vol_annual)
    .bind(score.max_drawdown)
    .bind(score.sma200)
    .bind(score.last_price)
    .bind(score.fundamentals_available)
    .bind(breakdown)
    .bind(score.computed_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Publish every staging row for `run_id` whose asset belongs to
/// `scope` into `scores_latest`, inside the caller's transaction
/// (spec §4.7 step 5 — the critical scope-isolation invariant).
pub async fn publish_staging_scores(
    tx: &mut sqlx::SqliteConnection,
    run_id: &str,
    scope: MarketScope,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO scores_latest (
            asset_id, market_scope, score_total, score_value, score_momentum,
            score_safety, score_fx_risk, score_liquidity_risk, confidence,
            state_label, rsi, zscore, vol_annual, max_drawdown, sma200,
            last_price, fundamentals_available, breakdown, computed_at
        )
        SELECT
            asset_id, market_scope, score_total, score_value, score_momentum,
            score_safety, score_fx_risk, score_liquidity_risk, confidence,
            state_label, rsi, zscore, vol_annual, max_drawdown, sma200,
            last_price, fundamentals_available, breakdown, computed_at
        FROM scores_staging
        WHERE run_id = ? AND market_scope = ?
        ON CONFLICT(asset_id) DO UPDATE SET
            market_scope = excluded.market_scope,
            score_total = excluded.score_total,
            score_value = excluded.score_value,
            score_momentum = excluded.score_momentum,
            score_safety = excluded.score_safety,
            score_fx_risk = excluded.score_fx_risk,
            score_liquidity_risk = excluded.score_liquidity_risk,
            confidence = excluded.confidence,
            state_label = excluded.state_label,
            rsi = excluded.rsi,
            zscore = excluded.zscore,
            vol_annual = excluded.vol_annual,
            max_drawdown = excluded.max_drawdown,
            sma200 = excluded.sma200,
            last_price = excluded.last_price,
            fundamentals_available = excluded.fundamentals_available,
            breakdown = excluded.breakdown,
            computed_at = excluded.computed_at
        "#,
    )
    .bind(run_id)
    .bind(scope.as_str())
    .execute(tx)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_staging_scores(executor: &mut sqlx::SqliteConnection, run_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM scores_staging WHERE run_id = ?")
        .bind(run_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn count_staging_scores(pool: &SqlitePool, run_id: &str) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scores_staging WHERE run_id = ?")
        .bind(run_id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}
