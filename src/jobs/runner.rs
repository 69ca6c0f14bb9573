use std::sync::Arc;

use tracing::{info, warn};

use crate::barstore::ColumnarBarStore;
use crate::concurrency::StripedLock;
use crate::domain::asset::Asset;
use crate::domain::bar::BarSeries;
use crate::domain::job::{JobMode, JobStatus, JobType};
use crate::domain::scope::MarketScope;
use crate::errors::Result;
use crate::external::price_provider::ProviderError;
use crate::external::MultiProvider;
use crate::gating::GatingEngine;
use crate::rotation::RotationSelector;
use crate::scoring::{QualityAdjuster, ScoringEngine};
use crate::store::RelationalStore;

/// How many daily bars a fetch asks the provider for when refreshing
/// an asset already on file (spec §4.2/§4.7 "fetch delta").
const DELTA_FETCH_DAYS: u32 = 10;
/// How many daily bars to request for an asset with no cached history.
const INITIAL_FETCH_DAYS: u32 = 400;

/// Outcome of one run, independent of whether it succeeded, failed, or
/// was rolled back (spec §4.7 step 4, §3 `JobRun`).
#[derive(Debug, Clone)]
pub struct JobReport {
    pub run_id: String,
    pub market_scope: MarketScope,
    pub job_type: JobType,
    pub mode: JobMode,
    pub assets_processed: i64,
    pub assets_success: i64,
    pub assets_failed: i64,
    pub scores_published: u64,
    pub gating_published: u64,
    pub status: JobStatus,
}

/// Drives one run end to end: select → stage → publish or rollback
/// (spec §4.7). Bound to a single `MarketScope` since its
/// `ColumnarBarStore` is scope-mandatory at construction; a deployment
/// running both scopes holds two `JobRunner`s.
pub struct JobRunner {
    store: RelationalStore,
    bar_store: ColumnarBarStore,
    provider: Arc<MultiProvider>,
    gating_engine: GatingEngine,
    scoring_engine: ScoringEngine,
    quality_adjuster: QualityAdjuster,
    lock: Arc<StripedLock>,
    scope: MarketScope,
    batch_size: usize,
}

impl JobRunner {
    pub fn new(
        store: RelationalStore,
        bar_store: ColumnarBarStore,
        provider: Arc<MultiProvider>,
        quality_adjuster: QualityAdjuster,
        lock: Arc<StripedLock>,
    ) -> Self {
        let scope = bar_store.scope();
        Self {
            store,
            bar_store,
            provider,
            gating_engine: GatingEngine::with_defaults(),
            scoring_engine: ScoringEngine::new(),
            quality_adjuster,
            lock,
            scope,
            batch_size: crate::rotation::DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn scope(&self) -> MarketScope {
        self.scope
    }

    /// Runs one rotation/gating/scoring pass. Never returns a per-asset
    /// failure as an `Err` — those are counted in the report. Only a
    /// failure in staging bookkeeping or publish triggers a rollback
    /// and propagates (spec §4.7 step 6).
    pub async fn run(
        &self,
        job_type: JobType,
        mode: JobMode,
        created_by: &str,
        asset_ids: Option<Vec<String>>,
    ) -> Result<JobReport> {
        let run_id = self.store.create_job_run(self.scope, job_type, mode, created_by).await?;
        info!(run_id, scope = %self.scope, job_type = %job_type, mode = %mode, "job run started");

        match self.run_inner(&run_id, job_type, mode, asset_ids).await {
            Ok((processed, success, failed)) => {
                self.store
                    .update_job_run_status(&run_id, JobStatus::Staging, processed, success, failed, None)
                    .await?;

                let (scores_published, gating_published) = self.store.publish_run(&run_id, self.scope).await?;
                info!(run_id, scores_published, gating_published, "job run published");

                Ok(JobReport {
                    run_id,
                    market_scope: self.scope,
                    job_type,
                    mode,
                    assets_processed: processed,
                    assets_success: success,
                    assets_failed: failed,
                    scores_published,
                    gating_published,
                    status: JobStatus::Success,
                })
            }
            Err(e) => {
                warn!(run_id, error = %e, "job run failed, rolling back");
                self.store
                    .update_job_run_status(&run_id, JobStatus::Failed, 0, 0, 0, Some(&e.to_string()))
                    .await
                    .ok();
                self.store.rollback_run(&run_id).await?;
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        run_id: &str,
        job_type: JobType,
        mode: JobMode,
        asset_ids: Option<Vec<String>>,
    ) -> Result<(i64, i64, i64)> {
        let selected = RotationSelector::select(&self.store, self.scope, mode, self.batch_size, asset_ids).await?;

        let mut processed = 0i64;
        let mut success = 0i64;
        let mut failed = 0i64;

        for chunk in selected.chunks(self.batch_size) {
            for asset_id in chunk {
                processed += 1;
                match self.process_one(run_id, job_type, asset_id).await {
                    Ok(()) => success += 1,
                    Err(e) => {
                        failed += 1;
                        warn!(asset_id, error = %e, "asset processing failed, continuing run");
                        self.store
                            .record_refresh(asset_id, 0, false, None, Some(&e.to_string()))
                            .await
                            .ok();
                    }
                }
            }
            tokio::task::yield_now().await;
        }

        Ok((processed, success, failed))
    }

    async fn process_one(&self, run_id: &str, job_type: JobType, asset_id: &str) -> Result<()> {
        let _guard = self.lock.lock(asset_id).await;

        let asset = self
            .store
            .get_asset(&asset_id.to_string())
            .await?
            .ok_or_else(|| crate::errors::AppError::AssetNotFound(asset_id.to_string()))?;

        let series = match job_type {
            JobType::Scoring => self.bar_store.load(asset_id)?.unwrap_or_default(),
            JobType::Rotation | JobType::Gating => self.fetch_and_upsert(&asset).await?,
        };

        let gating = match job_type {
            JobType::Scoring => match self.store.get_gating(asset_id).await? {
                Some(g) => g,
                None => self.gating_engine.evaluate(&asset, &series),
            },
            JobType::Rotation | JobType::Gating => {
                let gating = self.gating_engine.evaluate(&asset, &series);
                self.store.insert_staging_gating(run_id, &gating, self.scope).await?;
                gating
            }
        };

        if job_type != JobType::Gating && gating.eligible {
            let fundamentals = if asset.asset_type().has_value_pillar() {
                self.provider.fetch_fundamentals(asset_id).await.ok()
            } else {
                None
            };

            let mut score = self.scoring_engine.compute(&asset, &series, fundamentals.as_ref(), Some(&gating));
            if self.scope == MarketScope::UsEu {
                score = self.quality_adjuster.apply(score, &gating);
            }
            self.store.insert_staging_score(run_id, &score, self.scope).await?;
        }

        if job_type != JobType::Scoring {
            self.store.record_refresh(asset_id, asset.priority_level, false, None, None).await?;
        }

        Ok(())
    }

    async fn fetch_and_upsert(&self, asset: &Asset) -> Result<BarSeries> {
        let cached = self.bar_store.load(&asset.asset_id)?;
        let days = if cached.is_some() { DELTA_FETCH_DAYS } else { INITIAL_FETCH_DAYS };

        match self.provider.fetch_daily_history(&asset.asset_id, days).await {
            Ok(delta) => self.bar_store.upsert(&asset.asset_id, delta),
            Err(ProviderError::NotFound) if cached.is_some() => Ok(cached.unwrap()),
            Err(e) => Err(provider_err_to_app_err(e)),
        }
    }
}

fn provider_err_to_app_err(e: ProviderError) -> crate::errors::AppError {
    use crate::errors::AppError;
    match e {
        ProviderError::RateLimited => AppError::RateLimited,
        ProviderError::QuotaExhausted => AppError::QuotaExhausted,
        ProviderError::AuthFailure(msg) => AppError::AuthFailure(msg),
        ProviderError::NotFound => AppError::AssetNotFound("provider returned no data".to_string()),
        other => AppError::TransientProvider(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::AssetType;
    use crate::domain::fundamentals::Fundamentals;
    use crate::external::price_provider::{BulkEodRow, ExchangeListing, Health, HealthState, PriceProvider};
    use async_trait::async_trait;
    use chrono::Utc;

    struct FakeProvider;

    #[async_trait]
    impl PriceProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_daily_history(&self, _asset_id: &str, _days: u32) -> Result<BarSeries, ProviderError> {
            let rows: Vec<_> = (0..260)
                .rev()
                .map(|i| {
                    let date = Utc::now().date_naive() - chrono::Duration::days(i);
                    let close = 100.0 + (260 - i) as f64 * 0.05;
                    crate::domain::bar::BarRow { date, open: close, high: close, low: close, close, volume: 100_000.0, adj_close: Some(close) }
                })
                .collect();
            Ok(BarSeries::new(rows))
        }

        async fn fetch_fundamentals(&self, _asset_id: &str) -> Result<Fundamentals, ProviderError> {
            Ok(Fundamentals::empty())
        }

        async fn list_symbols(&self, _exchange_code: &str) -> Result<Vec<ExchangeListing>, ProviderError> {
            Err(ProviderError::Unsupported)
        }

        async fn bulk_eod(&self, _exchange_code: &str) -> Result<Vec<BulkEodRow>, ProviderError> {
            Err(ProviderError::Unsupported)
        }

        async fn health_check(&self) -> Health {
            Health { state: HealthState::Healthy, latency: std::time::Duration::ZERO }
        }
    }

    async fn seeded_runner(dir: &std::path::Path) -> JobRunner {
        let store = RelationalStore::connect(":memory:").await.unwrap();
        let mut asset = Asset::new("AAPL.US", "AAPL", "Apple", AssetType::Equity, MarketScope::UsEu, "US", "USD");
        asset.tier = 1;
        asset.active = true;
        store.upsert_asset(&asset, MarketScope::UsEu).await.unwrap();

        let bar_store = ColumnarBarStore::new(dir, MarketScope::UsEu).unwrap();
        let provider = Arc::new(MultiProvider::new(Some(Arc::new(FakeProvider)), None));
        JobRunner::new(store, bar_store, provider, QualityAdjuster::new(), Arc::new(StripedLock::new(4)))
    }

    #[tokio::test]
    async fn rotation_run_publishes_a_score_for_a_liquid_asset() {
        let dir = tempfile::tempdir().unwrap();
        let runner = seeded_runner(dir.path()).await;

        let report = runner
            .run(JobType::Rotation, JobMode::OnDemand, "test", Some(vec!["AAPL.US".to_string()]))
            .await
            .unwrap();

        assert_eq!(report.status, JobStatus::Success);
        assert_eq!(report.assets_success, 1);
        assert_eq!(report.assets_failed, 0);

        let score = runner.store.get_score("AAPL.US").await.unwrap();
        assert!(score.is_some());
    }

    #[tokio::test]
    async fn unknown_asset_is_counted_as_failed_without_aborting_run() {
        let dir = tempfile::tempdir().unwrap();
        let runner = seeded_runner(dir.path()).await;

        let report = runner
            .run(JobType::Rotation, JobMode::OnDemand, "test", Some(vec!["GHOST.US".to_string()]))
            .await
            .unwrap();

        assert_eq!(report.assets_failed, 1);
        assert_eq!(report.assets_success, 0);
        assert_eq!(report.status, JobStatus::Success);
    }
}
