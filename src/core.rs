//! Explicit dependency-injected context (spec §9 redesign: "global
//! singletons → explicit `Core` struct... constructed once in
//! `main.rs` and passed by reference/`Arc` to every operation; tests
//! construct an isolated `Core` per test"). Every spec §6 external
//! operation is an inherent async method here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex as AsyncMutex;

use crate::adhoc::{AdHocRequest, AdHocResult, AdHocService};
use crate::barstore::ColumnarBarStore;
use crate::concurrency::StripedLock;
use crate::config::Config;
use crate::domain::job::{JobMode, JobRun, JobStatus, JobType};
use crate::domain::quota::Plan;
use crate::domain::scope::MarketScope;
use crate::errors::{AppError, Result};
use crate::external::fallback_provider::FallbackProvider;
use crate::external::primary_provider::PrimaryProvider;
use crate::external::price_provider::PriceProvider;
use crate::external::MultiProvider;
use crate::jobs::{JobReport, JobRunner};
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerContext, SchedulerHandle};
use crate::scoring::QualityAdjuster;
use crate::search::{self, AssetSearchFilters, Pagination, SearchResults};
use crate::store::RelationalStore;
use crate::universe::UniverseBuilder;

/// Result of `runRotation`/`runGating`/`runScoring` (spec §6 `JobResult`).
#[derive(Debug, Clone)]
pub struct JobResult {
    pub run_id: String,
    pub status: JobStatus,
    pub processed: i64,
    pub success: i64,
    pub failed: i64,
    pub duration_s: f64,
    pub error: Option<String>,
}

impl JobResult {
    fn from_report(report: JobReport, duration_s: f64) -> Self {
        Self {
            run_id: report.run_id,
            status: report.status,
            processed: report.assets_processed,
            success: report.assets_success,
            failed: report.assets_failed,
            duration_s,
            error: None,
        }
    }

    fn from_err(run_id: String, duration_s: f64, error: AppError) -> Self {
        Self {
            run_id,
            status: JobStatus::Failed,
            processed: 0,
            success: 0,
            failed: 0,
            duration_s,
            error: Some(error.to_string()),
        }
    }
}

const ASSET_LOCK_SHARDS: usize = 64;

/// Owns one `RelationalStore`, one `MultiProvider`, and a per-scope
/// `JobRunner`/`UniverseBuilder`/`ColumnarBarStore` set (spec §3 scope
/// isolation: every store row and bar file is scope-qualified, so
/// `Core` keeps the scope-bound collaborators in maps rather than
/// picking one scope at construction like `JobRunner` does).
pub struct Core {
    pub config: Config,
    pub store: RelationalStore,
    provider: Arc<MultiProvider>,
    runners: HashMap<MarketScope, Arc<JobRunner>>,
    universe_builders: HashMap<MarketScope, Arc<UniverseBuilder>>,
    bar_stores: HashMap<MarketScope, ColumnarBarStore>,
    adhoc: AdHocService,
    scheduler_handle: AsyncMutex<Option<SchedulerHandle>>,
}

impl Core {
    pub async fn new(config: Config) -> Result<Self> {
        let store = RelationalStore::connect(&config.sqlite_path).await?;

        let primary: Option<Arc<dyn PriceProvider>> = config
            .eodhd_api_key
            .as_ref()
            .map(|key| Arc::new(PrimaryProvider::new(config.eodhd_base_url.clone(), key.clone())) as Arc<dyn PriceProvider>);
        let fallback: Arc<dyn PriceProvider> = Arc::new(FallbackProvider::new("https://query1.finance.yahoo.com"));
        let provider = Arc::new(MultiProvider::new(primary, Some(fallback)));

        let quality_adjuster = QualityAdjuster::from_store(&store).await?;
        let lock = Arc::new(StripedLock::new(ASSET_LOCK_SHARDS));

        let mut runners = HashMap::new();
        let mut universe_builders = HashMap::new();
        let mut bar_stores = HashMap::new();
        for scope in MarketScope::all() {
            let bar_store = ColumnarBarStore::new(config.bar_dir(scope), scope)?;
            let runner = JobRunner::new(store.clone(), bar_store.clone(), provider.clone(), quality_adjuster.clone(), lock.clone())
                .with_batch_size(config.rotation_batch_size);
            runners.insert(scope, Arc::new(runner));
            universe_builders.insert(scope, Arc::new(UniverseBuilder::new(store.clone(), provider.clone())));
            bar_stores.insert(scope, bar_store);
        }

        let adhoc = AdHocService::new(store.clone(), config.default_exchange.clone(), provider.clone(), quality_adjuster, lock);

        Ok(Self {
            config,
            store,
            provider,
            runners,
            universe_builders,
            bar_stores,
            adhoc,
            scheduler_handle: AsyncMutex::new(None),
        })
    }

    fn runner(&self, scope: MarketScope) -> Result<&Arc<JobRunner>> {
        self.runners.get(&scope).ok_or_else(|| AppError::Internal(format!("no job runner for scope {scope}")))
    }

    fn universe_builder(&self, scope: MarketScope) -> Result<&Arc<UniverseBuilder>> {
        self.universe_builders
            .get(&scope)
            .ok_or_else(|| AppError::Internal(format!("no universe builder for scope {scope}")))
    }

    async fn run_job(&self, scope: MarketScope, job_type: JobType, mode: JobMode, asset_ids: Option<Vec<String>>) -> JobResult {
        let runner = match self.runner(scope) {
            Ok(r) => r,
            Err(e) => return JobResult::from_err(String::new(), 0.0, e),
        };
        let started = Instant::now();
        match runner.run(job_type, mode, "cli", asset_ids).await {
            Ok(report) => JobResult::from_report(report, started.elapsed().as_secs_f64()),
            Err(e) => JobResult::from_err(String::new(), started.elapsed().as_secs_f64(), e),
        }
    }

    pub async fn run_rotation(&self, scope: MarketScope, mode: JobMode, asset_ids: Option<Vec<String>>) -> JobResult {
        self.run_job(scope, JobType::Rotation, mode, asset_ids).await
    }

    pub async fn run_gating(&self, scope: MarketScope, mode: JobMode, asset_ids: Option<Vec<String>>) -> JobResult {
        self.run_job(scope, JobType::Gating, mode, asset_ids).await
    }

    pub async fn run_scoring(&self, scope: MarketScope, mode: JobMode, asset_ids: Option<Vec<String>>) -> JobResult {
        self.run_job(scope, JobType::Scoring, mode, asset_ids).await
    }

    pub async fn rebuild_universe(&self, scope: MarketScope) -> Result<crate::universe::UniverseBuildReport> {
        self.universe_builder(scope)?.rebuild(scope).await
    }

    pub async fn rebuild_universe_from_csv(&self, scope: MarketScope, path: &std::path::Path) -> Result<crate::universe::UniverseBuildReport> {
        self.universe_builder(scope)?.rebuild_from_csv(scope, path).await
    }

    /// One queue-worker-tick iteration (spec §6 `worker`); claims up to
    /// `max_jobs` PENDING items, optionally restricted to one scope.
    pub async fn drain_queue_once(&self, scope: Option<MarketScope>, max_jobs: i64) -> Result<usize> {
        crate::scheduler::drain_queue_once(&self.store, &self.runners, &self.universe_builders, scope, max_jobs).await
    }

    /// `scoreTicker` (spec §6/§4.11). Looks up the bar store for the
    /// request's resolved scope at call time since that isn't known
    /// until `raw_ticker` has been parsed.
    pub async fn score_ticker(&self, req: AdHocRequest) -> Result<AdHocResult> {
        let pairs: Vec<(MarketScope, &ColumnarBarStore)> =
            self.bar_stores.iter().map(|(&scope, store)| (scope, store)).collect();
        self.adhoc.score_ticker(&pairs, req).await
    }

    pub async fn search_assets(&self, filters: &AssetSearchFilters, pagination: &Pagination) -> Result<SearchResults> {
        search::search_assets(&self.store, filters, pagination).await
    }

    pub async fn top_scores(&self, scope: MarketScope, limit: i64) -> Result<Vec<crate::domain::score::Score>> {
        self.store.get_top_scores(limit, scope).await
    }

    pub async fn enqueue_job(&self, job_type: &str, scope: Option<MarketScope>, payload: serde_json::Value, requested_by: &str) -> Result<String> {
        self.store.enqueue_job(job_type, scope, payload, requested_by).await
    }

    pub async fn get_job_run(&self, run_id: &str) -> Result<Option<JobRun>> {
        self.store.get_job_run(run_id).await
    }

    pub async fn recent_jobs(&self, limit: i64) -> Result<Vec<JobRun>> {
        self.store.recent_jobs(limit).await
    }

    pub fn provider(&self) -> &Arc<MultiProvider> {
        &self.provider
    }

    /// Starts the scheduler (spec §4.10 four periodic jobs + queue
    /// worker tick). Returns an error if it's already running.
    pub async fn start_scheduler(&self) -> Result<()> {
        let mut guard = self.scheduler_handle.lock().await;
        if guard.is_some() {
            return Err(AppError::Internal("scheduler already running".to_string()));
        }
        let ctx = SchedulerContext {
            store: self.store.clone(),
            runners: self.runners.clone(),
            universe_builders: self.universe_builders.clone(),
            config: SchedulerConfig {
                rotation_minutes: self.config.schedule_rotation_minutes,
                gating_hours: self.config.schedule_gating_hours,
                universe_days: self.config.schedule_universe_days,
                max_jobs_per_tick: 10,
            },
        };
        let handle = Scheduler::start(ctx).await?;
        *guard = Some(handle);
        Ok(())
    }

    pub async fn stop_scheduler(&self) -> Result<()> {
        let mut guard = self.scheduler_handle.lock().await;
        if let Some(handle) = guard.take() {
            handle.shutdown().await?;
        }
        Ok(())
    }
}

/// Convenience request builder for the CLI's `score` path (not part of
/// spec §6's named operations, but every caller of `score_ticker`
/// needs one; kept here rather than duplicated in `main.rs`).
pub fn adhoc_request(raw_ticker: impl Into<String>, user_id: impl Into<String>, plan: Plan, force_refresh: bool) -> AdHocRequest {
    AdHocRequest {
        raw_ticker: raw_ticker.into(),
        exchange: None,
        asset_type: None,
        force_refresh,
        add_to_universe: false,
        user_id: user_id.into(),
        plan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            eodhd_api_key: None,
            eodhd_base_url: "https://eodhd.com/api".to_string(),
            default_exchange: "US".to_string(),
            data_dir: std::env::temp_dir().join("marketgps-core-test").to_string_lossy().to_string(),
            sqlite_path: ":memory:".to_string(),
            rotation_batch_size: 10,
            rotation_period_minutes: 15,
            schedule_rotation_minutes: 15,
            schedule_gating_hours: 6,
            schedule_pool_hours: 1,
            schedule_universe_days: 7,
            billing_mode: "standard".to_string(),
        }
    }

    #[tokio::test]
    async fn constructs_with_both_scopes_wired() {
        let core = Core::new(test_config()).await.unwrap();
        assert!(core.runner(MarketScope::UsEu).is_ok());
        assert!(core.runner(MarketScope::Africa).is_ok());
    }

    #[tokio::test]
    async fn empty_universe_rotation_reports_zero_processed() {
        let core = Core::new(test_config()).await.unwrap();
        let result = core.run_rotation(MarketScope::UsEu, JobMode::OnDemand, None).await;
        assert_eq!(result.processed, 0);
        assert_eq!(result.status, JobStatus::Success);
    }
}
