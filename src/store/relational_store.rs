use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::asset::{Asset, AssetId};
use crate::domain::gating::GatingStatus;
use crate::domain::job::{JobMode, JobRun, JobStatus, JobType, QueueItem};
use crate::domain::quota::{Plan, UserQuota};
use crate::domain::rotation::RotationState;
use crate::domain::scope::MarketScope;
use crate::domain::score::Score;
use crate::errors::Result;

use super::{
    calibration_queries, gating_queries, job_queries, quota_queries, queue_queries, rotation_queries, score_queries,
    schema, universe_queries,
};

/// Thin façade over the per-table query modules, grounded on the
/// teacher's `db/*_queries.rs` free-function style (spec §4.1). Holds
/// the single `SqlitePool` for the embedded store.
#[derive(Clone)]
pub struct RelationalStore {
    pool: SqlitePool,
}

impl RelationalStore {
    pub async fn connect(sqlite_path: &str) -> Result<Self> {
        let pool = schema::connect(sqlite_path).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // --- universe ---

    pub async fn upsert_asset(&self, asset: &Asset, _scope: MarketScope) -> Result<()> {
        universe_queries::upsert_asset(&self.pool, asset).await
    }

    pub async fn bulk_upsert_assets(&self, assets: &[Asset], _scope: MarketScope) -> Result<()> {
        universe_queries::bulk_upsert_assets(&self.pool, assets).await
    }

    pub async fn get_asset(&self, asset_id: &AssetId) -> Result<Option<Asset>> {
        universe_queries::get_asset(&self.pool, asset_id).await
    }

    pub async fn get_active_assets(&self, scope: MarketScope) -> Result<Vec<Asset>> {
        universe_queries::get_active_assets(&self.pool, scope).await
    }

    pub async fn get_eligible_assets(&self, scope: MarketScope) -> Result<Vec<Asset>> {
        universe_queries::get_eligible_assets(&self.pool, scope).await
    }

    pub async fn get_priority_assets(&self, limit: i64, scope: MarketScope) -> Result<Vec<Asset>> {
        universe_queries::get_priority_assets(&self.pool, limit, scope).await
    }

    pub async fn get_tier1_assets(&self, scope: MarketScope) -> Result<Vec<Asset>> {
        universe_queries::get_tier1_assets(&self.pool, scope).await
    }

    pub async fn get_tier2_assets_by_staleness(&self, scope: MarketScope, limit: i64) -> Result<Vec<Asset>> {
        universe_queries::get_tier2_assets_by_staleness(&self.pool, scope, limit).await
    }

    // --- scores ---

    /// Compatibility path used by on-demand scoring, which writes
    /// directly to `scores_latest` (spec §4.1 schema invariant).
    pub async fn upsert_score(&self, score: &Score, _scope: MarketScope) -> Result<()> {
        score_queries::upsert_score(&self.pool, score).await
    }

    pub async fn get_score(&self, asset_id: &str) -> Result<Option<Score>> {
        score_queries::get_score(&self.pool, asset_id).await
    }

    pub async fn get_top_scores(&self, limit: i64, scope: MarketScope) -> Result<Vec<Score>> {
        score_queries::get_top_scores(&self.pool, limit, scope).await
    }

    pub async fn get_top50_asset_ids(&self, scope: MarketScope) -> Result<Vec<String>> {
        score_queries::get_top50_asset_ids(&self.pool, scope).await
    }

    // --- gating ---

    pub async fn upsert_gating(&self, status: &GatingStatus, _scope: MarketScope) -> Result<()> {
        gating_queries::upsert_gating(&self.pool, status).await
    }

    pub async fn get_gating(&self, asset_id: &str) -> Result<Option<GatingStatus>> {
        gating_queries::get_gating(&self.pool, asset_id).await
    }

    // --- staging ---

    pub async fn insert_staging_score(&self, run_id: &str, score: &Score, _scope: MarketScope) -> Result<()> {
        score_queries::insert_staging_score(&self.pool, run_id, score).await
    }

    pub async fn insert_staging_gating(&self, run_id: &str, status: &GatingStatus, _scope: MarketScope) -> Result<()> {
        gating_queries::insert_staging_gating(&self.pool, run_id, status).await
    }

    /// Publishes all staging rows for `run_id` that belong to `scope`
    /// in one serialized transaction, then clears staging (spec §4.7
    /// step 5, §8 "Atomicity" and "Scope isolation" properties).
    pub async fn publish_run(&self, run_id: &str, scope: MarketScope) -> Result<(u64, u64)> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *tx).await.ok();

        let scores_published = score_queries::publish_staging_scores(&mut tx, run_id, scope).await?;
        let gating_published = publish_staging_gating(&mut tx, run_id, scope).await?;

        score_queries::delete_staging_scores(&mut tx, run_id).await?;
        gating_queries::delete_staging_gating(&mut tx, run_id).await?;

        job_queries_update_status_in_tx(&mut tx, run_id, JobStatus::Success).await?;

        tx.commit().await?;
        Ok((scores_published, gating_published))
    }

    /// Clears staging rows for `run_id` and marks the run cancelled;
    /// published tables are never touched (spec §4.7 step 6).
    pub async fn rollback_run(&self, run_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        score_queries::delete_staging_scores(&mut tx, run_id).await?;
        gating_queries::delete_staging_gating(&mut tx, run_id).await?;
        job_queries_update_status_in_tx(&mut tx, run_id, JobStatus::Cancelled).await?;
        tx.commit().await?;
        Ok(())
    }

    // --- job runs ---

    pub async fn create_job_run(
        &self,
        scope: MarketScope,
        job_type: JobType,
        mode: JobMode,
        created_by: &str,
    ) -> Result<String> {
        job_queries::create_job_run(&self.pool, scope, job_type, mode, created_by).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_job_run_status(
        &self,
        run_id: &str,
        status: JobStatus,
        assets_processed: i64,
        assets_success: i64,
        assets_failed: i64,
        error: Option<&str>,
    ) -> Result<()> {
        job_queries::update_job_run_status(&self.pool, run_id, status, assets_processed, assets_success, assets_failed, error).await
    }

    pub async fn get_job_run(&self, run_id: &str) -> Result<Option<JobRun>> {
        job_queries::get_job_run(&self.pool, run_id).await
    }

    pub async fn recent_jobs(&self, limit: i64) -> Result<Vec<JobRun>> {
        job_queries::recent_jobs(&self.pool, limit).await
    }

    // --- queue ---

    pub async fn enqueue_job(
        &self,
        job_type: &str,
        scope: Option<MarketScope>,
        payload: serde_json::Value,
        requested_by: &str,
    ) -> Result<String> {
        queue_queries::enqueue_job(&self.pool, job_type, scope, payload, requested_by).await
    }

    pub async fn fetch_next_job_atomic(&self, scope: Option<MarketScope>) -> Result<Option<QueueItem>> {
        queue_queries::fetch_next_job_atomic(&self.pool, scope).await
    }

    pub async fn mark_job_done(&self, id: &str) -> Result<()> {
        queue_queries::mark_job_done(&self.pool, id).await
    }

    pub async fn mark_job_failed(&self, id: &str, error: &str) -> Result<()> {
        queue_queries::mark_job_failed(&self.pool, id, error).await
    }

    // --- quota ---

    pub async fn get_user_quota(&self, user_id: &str, plan: Plan) -> Result<UserQuota> {
        quota_queries::get_user_quota(&self.pool, user_id, plan).await
    }

    pub async fn increment_usage(&self, user_id: &str, plan: Plan) -> Result<i64> {
        quota_queries::increment_usage(&self.pool, user_id, plan).await
    }

    pub async fn reset_daily_if_new_day(&self, user_id: &str) -> Result<i64> {
        quota_queries::reset_daily_if_new_day(&self.pool, user_id).await
    }

    // --- calibration ---

    pub async fn get_calibration_param(&self, key: &str, default: f64) -> Result<f64> {
        calibration_queries::get_param(&self.pool, key, default).await
    }

    pub async fn set_calibration_param(&self, key: &str, value: f64) -> Result<()> {
        calibration_queries::set_param(&self.pool, key, value).await
    }

    // --- rotation ---

    pub async fn get_rotation_state(&self, asset_id: &str) -> Result<Option<RotationState>> {
        rotation_queries::get_rotation_state(&self.pool, asset_id).await
    }

    pub async fn record_refresh(
        &self,
        asset_id: &str,
        priority_level: i32,
        in_top50: bool,
        cooldown_until: Option<chrono::DateTime<Utc>>,
        last_error: Option<&str>,
    ) -> Result<()> {
        rotation_queries::record_refresh(&self.pool, asset_id, priority_level, in_top50, cooldown_until, last_error)
            .await
    }
}

async fn publish_staging_gating(tx: &mut sqlx::SqliteConnection, run_id: &str, scope: MarketScope) -> Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO gating_status (
            asset_id, market_scope, coverage, liquidity, price_min, stale_ratio,
            zero_volume_ratio, eligible, reason, data_confidence, fx_risk,
            liquidity_risk, last_bar_date, updated_at
        )
        SELECT
            asset_id, market_scope, coverage, liquidity, price_min, stale_ratio,
            zero_volume_ratio, eligible, reason, data_confidence, fx_risk,
            liquidity_risk, last_bar_date, updated_at
        FROM gating_staging
        WHERE run_id = ? AND market_scope = ?
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
    .bind(run_id)
    .bind(scope.as_str())
    .execute(tx)
    .await?;
    Ok(result.rows_affected())
}

async fn job_queries_update_status_in_tx(
    tx: &mut sqlx::SqliteConnection,
    run_id: &str,
    status: JobStatus,
) -> Result<()> {
    sqlx::query("UPDATE job_runs SET status = ?, ended_at = ? WHERE run_id = ?")
        .bind(status.as_str())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(run_id)
        .execute(tx)
        .await?;
    Ok(())
}
