use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::Result;

/// Opens the embedded single-writer store at `sqlite_path`, enabling
/// WAL mode and a busy timeout so readers never block a writer (spec
/// §4.1). The pool is capped small — this is a single-writer engine,
/// not a client-server pool like the teacher's `PgPoolOptions`.
///
/// `":memory:"` is special-cased for tests and integration fixtures:
/// no directory is created and WAL is skipped (unsupported for
/// in-memory sqlite), keeping one connection so the schema survives
/// across pooled connections.
pub async fn connect(sqlite_path: &str) -> Result<SqlitePool> {
    if sqlite_path == ":memory:" {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| crate::errors::AppError::Internal(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
        create_schema(&pool).await?;
        return Ok(pool);
    }

    if let Some(parent) = Path::new(sqlite_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{sqlite_path}"))
        .map_err(|e| crate::errors::AppError::Internal(e.to_string()))?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(10));

    let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;

    sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Idempotent `CREATE TABLE IF NOT EXISTS` statements. This corpus
/// slice ships no migration runner, so schema setup runs imperatively
/// at startup rather than via `sqlx migrate` (spec.md §4.1).
async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS universe (
            asset_id TEXT PRIMARY KEY,
            symbol TEXT NOT NULL,
            name TEXT NOT NULL,
            asset_type TEXT NOT NULL,
            market_scope TEXT NOT NULL,
            market_code TEXT NOT NULL,
            exchange_code TEXT NOT NULL,
            currency TEXT NOT NULL,
            country TEXT,
            sector TEXT,
            industry TEXT,
            tier INTEGER NOT NULL DEFAULT 4,
            priority_level INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_universe_scope ON universe(market_scope)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gating_status (
            asset_id TEXT PRIMARY KEY,
            market_scope TEXT NOT NULL,
            coverage REAL NOT NULL,
            liquidity REAL NOT NULL,
            price_min REAL NOT NULL,
            stale_ratio REAL NOT NULL,
            zero_volume_ratio REAL NOT NULL,
            eligible INTEGER NOT NULL,
            reason TEXT,
            data_confidence REAL NOT NULL,
            fx_risk REAL,
            liquidity_risk REAL,
            last_bar_date TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scores_latest (
            asset_id TEXT PRIMARY KEY,
            market_scope TEXT NOT NULL,
            score_total REAL,
            score_value REAL,
            score_momentum REAL,
            score_safety REAL,
            score_fx_risk REAL,
            score_liquidity_risk REAL,
            confidence INTEGER NOT NULL,
            state_label TEXT NOT NULL,
            rsi REAL,
            zscore REAL,
            vol_annual REAL,
            max_drawdown REAL,
            sma200 REAL,
            last_price REAL,
            fundamentals_available INTEGER NOT NULL,
            breakdown TEXT NOT NULL,
            computed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scores_scope ON scores_latest(market_scope)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scores_staging (
            run_id TEXT NOT NULL,
            asset_id TEXT NOT NULL,
            market_scope TEXT NOT NULL,
            score_total REAL,
            score_value REAL,
            score_momentum REAL,
            score_safety REAL,
            score_fx_risk REAL,
            score_liquidity_risk REAL,
            confidence INTEGER NOT NULL,
            state_label TEXT NOT NULL,
            rsi REAL,
            zscore REAL,
            vol_annual REAL,
            max_drawdown REAL,
            sma200 REAL,
            last_price REAL,
            fundamentals_available INTEGER NOT NULL,
            breakdown TEXT NOT NULL,
            computed_at TEXT NOT NULL,
            PRIMARY KEY (run_id, asset_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scores_staging_run ON scores_staging(run_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gating_staging (
            run_id TEXT NOT NULL,
            asset_id TEXT NOT NULL,
            market_scope TEXT NOT NULL,
            coverage REAL NOT NULL,
            liquidity REAL NOT NULL,
            price_min REAL NOT NULL,
            stale_ratio REAL NOT NULL,
            zero_volume_ratio REAL NOT NULL,
            eligible INTEGER NOT NULL,
            reason TEXT,
            data_confidence REAL NOT NULL,
            fx_risk REAL,
            liquidity_risk REAL,
            last_bar_date TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (run_id, asset_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_gating_staging_run ON gating_staging(run_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rotation_state (
            asset_id TEXT PRIMARY KEY,
            last_refresh_at TEXT,
            priority_level INTEGER NOT NULL DEFAULT 0,
            in_top50 INTEGER NOT NULL DEFAULT 0,
            cooldown_until TEXT,
            last_error TEXT,
            refresh_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_runs (
            run_id TEXT PRIMARY KEY,
            market_scope TEXT NOT NULL,
            job_type TEXT NOT NULL,
            mode TEXT NOT NULL,
            created_by TEXT NOT NULL,
            status TEXT NOT NULL,
            assets_processed INTEGER NOT NULL DEFAULT 0,
            assets_success INTEGER NOT NULL DEFAULT 0,
            assets_failed INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_queue (
            id TEXT PRIMARY KEY,
            job_type TEXT NOT NULL,
            market_scope TEXT,
            payload TEXT NOT NULL,
            status TEXT NOT NULL,
            requested_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_queue_status ON job_queue(status, market_scope)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS usage_daily (
            user_id TEXT NOT NULL,
            date TEXT NOT NULL,
            plan TEXT NOT NULL,
            daily_used INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS calibration_params (
            key TEXT PRIMARY KEY,
            value REAL NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
