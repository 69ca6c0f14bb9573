//! End-to-end coverage for the run lifecycle that unit tests in
//! `src/jobs/runner.rs` don't reach: publish across concurrent scopes
//! and rollback leaving published tables untouched.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use marketgps_core::barstore::ColumnarBarStore;
use marketgps_core::concurrency::StripedLock;
use marketgps_core::domain::asset::{Asset, AssetType};
use marketgps_core::domain::bar::{BarRow, BarSeries};
use marketgps_core::domain::fundamentals::Fundamentals;
use marketgps_core::domain::job::{JobMode, JobStatus, JobType};
use marketgps_core::domain::scope::MarketScope;
use marketgps_core::external::price_provider::{BulkEodRow, ExchangeListing, Health, HealthState, PriceProvider, ProviderError};
use marketgps_core::external::MultiProvider;
use marketgps_core::jobs::JobRunner;
use marketgps_core::scoring::QualityAdjuster;
use marketgps_core::store::RelationalStore;

struct LiquidProvider;

#[async_trait]
impl PriceProvider for LiquidProvider {
    fn name(&self) -> &'static str {
        "liquid"
    }

    async fn fetch_daily_history(&self, _asset_id: &str, _days: u32) -> Result<BarSeries, ProviderError> {
        let rows: Vec<BarRow> = (0..260)
            .rev()
            .map(|i| {
                let date = Utc::now().date_naive() - chrono::Duration::days(i);
                let close = 50.0 + (260 - i) as f64 * 0.03;
                BarRow { date, open: close, high: close, low: close, close, volume: 200_000.0, adj_close: Some(close) }
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

fn runner_for(store: RelationalStore, dir: &std::path::Path, scope: MarketScope) -> JobRunner {
    let bar_store = ColumnarBarStore::new(dir, scope).unwrap();
    let provider = Arc::new(MultiProvider::new(Some(Arc::new(LiquidProvider)), None));
    JobRunner::new(store, bar_store, provider, QualityAdjuster::new(), Arc::new(StripedLock::new(4)))
}

/// A published score in one scope is untouched by a publish in the
/// other scope: every staging row and the publish transaction itself
/// are filtered by `market_scope`, so two runs against the same store
/// never cross-contaminate each other's published tables.
#[tokio::test]
async fn publish_is_isolated_per_scope() {
    let store = RelationalStore::connect(":memory:").await.unwrap();

    let mut us_asset = Asset::new("AAPL.US", "AAPL", "Apple", AssetType::Equity, MarketScope::UsEu, "US", "USD");
    us_asset.tier = 1;
    us_asset.active = true;
    store.upsert_asset(&us_asset, MarketScope::UsEu).await.unwrap();

    let mut africa_asset = Asset::new("MTN.JSE", "MTN", "MTN Group", AssetType::Equity, MarketScope::Africa, "JSE", "ZAR");
    africa_asset.tier = 1;
    africa_asset.active = true;
    store.upsert_asset(&africa_asset, MarketScope::Africa).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let us_runner = runner_for(store.clone(), dir.path(), MarketScope::UsEu);
    let report = us_runner
        .run(JobType::Rotation, JobMode::OnDemand, "test", Some(vec!["AAPL.US".to_string()]))
        .await
        .unwrap();
    assert_eq!(report.status, JobStatus::Success);

    let before = store.get_score("AAPL.US").await.unwrap().expect("AAPL.US should have a published score");

    let africa_runner = runner_for(store.clone(), dir.path(), MarketScope::Africa);
    let africa_report = africa_runner
        .run(JobType::Rotation, JobMode::OnDemand, "test", Some(vec!["MTN.JSE".to_string()]))
        .await
        .unwrap();
    assert_eq!(africa_report.status, JobStatus::Success);

    let after = store.get_score("AAPL.US").await.unwrap().expect("AAPL.US score must survive an unrelated AFRICA publish");
    assert_eq!(before.score_total, after.score_total);
    assert_eq!(before.computed_at, after.computed_at);

    let africa_score = store.get_score("MTN.JSE").await.unwrap();
    assert!(africa_score.is_some(), "AFRICA run should have published its own score independently");
}

/// `rollback_run` clears staging for that run and marks it cancelled
/// without touching whatever was already published.
#[tokio::test]
async fn rollback_clears_staging_and_leaves_published_rows_alone() {
    let store = RelationalStore::connect(":memory:").await.unwrap();

    let mut asset = Asset::new("AAPL.US", "AAPL", "Apple", AssetType::Equity, MarketScope::UsEu, "US", "USD");
    asset.tier = 1;
    asset.active = true;
    store.upsert_asset(&asset, MarketScope::UsEu).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let runner = runner_for(store.clone(), dir.path(), MarketScope::UsEu);
    runner.run(JobType::Rotation, JobMode::OnDemand, "test", Some(vec!["AAPL.US".to_string()])).await.unwrap();
    let published_before = store.get_score("AAPL.US").await.unwrap().expect("should be published by the first run");

    let run_id = store.create_job_run(MarketScope::UsEu, JobType::Rotation, JobMode::OnDemand, "test").await.unwrap();
    let mut staged = published_before.clone();
    staged.score_total = Some(1.0);
    store.insert_staging_score(&run_id, &staged, MarketScope::UsEu).await.unwrap();

    store.rollback_run(&run_id).await.unwrap();

    let staged_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scores_staging WHERE run_id = ?")
        .bind(&run_id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(staged_count, 0, "staging rows for the rolled-back run must be gone");

    let run = store.get_job_run(&run_id).await.unwrap().expect("run row should still exist");
    assert_eq!(run.status(), JobStatus::Cancelled);

    let published_after = store.get_score("AAPL.US").await.unwrap().unwrap();
    assert_eq!(published_before.score_total, published_after.score_total, "rollback must not touch already-published rows");
}

/// `hourly_overlay` mode at a scale close to a production universe:
/// Tier-1 stays fully covered and Tier-2 backfill never fires.
#[tokio::test]
async fn hourly_overlay_at_scale_never_touches_tier2() {
    use marketgps_core::domain::job::JobMode as Mode;
    use marketgps_core::rotation::RotationSelector;

    let store = RelationalStore::connect(":memory:").await.unwrap();

    let mut assets: Vec<Asset> = (0..100)
        .map(|i| {
            let mut a = Asset::new(format!("T1-{i}.US"), format!("T1-{i}"), "t1", AssetType::Equity, MarketScope::UsEu, "US", "USD");
            a.tier = 1;
            a.active = true;
            a
        })
        .collect();
    assets.extend((0..1000).map(|i| {
        let mut a = Asset::new(format!("T2-{i}.US"), format!("T2-{i}"), "t2", AssetType::Equity, MarketScope::UsEu, "US", "USD");
        a.tier = 2;
        a.active = true;
        a
    }));
    store.bulk_upsert_assets(&assets, MarketScope::UsEu).await.unwrap();

    let selected = RotationSelector::select(&store, MarketScope::UsEu, Mode::HourlyOverlay, 50, None).await.unwrap();
    assert!(selected.len() <= 50);
    assert!(selected.iter().all(|id| id.starts_with("T1-")), "hourly overlay must never backfill tier 2");
}
