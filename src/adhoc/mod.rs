//! Single-asset scoring path with per-user daily quota enforcement
//! (spec §4.11). Shares the `ScoringEngine`/`QualityAdjuster` used by
//! `JobRunner` (spec §9 "stateless scoring engine... a rotation run
//! and an ad-hoc `scoreTicker` call share this one engine"), but
//! writes directly to `scores_latest` via the compatibility
//! `upsert_score` path rather than through staging/publish (spec §4.1
//! schema invariant).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::barstore::ColumnarBarStore;
use crate::concurrency::StripedLock;
use crate::domain::asset::{Asset, AssetType};
use crate::domain::quota::Plan;
use crate::domain::score::Score;
use crate::domain::scope::MarketScope;
use crate::errors::{AppError, Result};
use crate::external::price_provider::ProviderError;
use crate::external::{MultiProvider, ProviderSelection};
use crate::gating::GatingEngine;
use crate::scoring::engine::MIN_USABLE_BARS;
use crate::scoring::{QualityAdjuster, ScoringEngine};
use crate::store::RelationalStore;
use crate::external::symbol;

/// A cached score younger than this is served without consuming quota
/// (spec §4.11 step 2).
const CACHE_FRESHNESS: Duration = Duration::from_secs(24 * 3600);

/// How many daily bars an ad-hoc lookup requests (spec §4.11 step 4
/// "Require at least 50 bars").
const ADHOC_FETCH_DAYS: u32 = 400;

#[derive(Debug, Clone)]
pub struct AdHocRequest {
    pub raw_ticker: String,
    pub exchange: Option<String>,
    pub asset_type: Option<AssetType>,
    pub force_refresh: bool,
    pub add_to_universe: bool,
    pub user_id: String,
    pub plan: Plan,
}

#[derive(Debug, Clone)]
pub struct AdHocResult {
    pub asset_id: String,
    pub score: Score,
    pub data_source: &'static str,
    pub was_in_universe: bool,
    pub added_to_universe: bool,
    pub served_from_cache: bool,
}

/// Drives `scoreTicker` (spec §4.11), composing the same
/// `ScoringEngine`/`GatingEngine`/`QualityAdjuster`/`StripedLock` the
/// job runner uses, plus the per-user `QuotaManager`.
pub struct AdHocService {
    store: RelationalStore,
    default_exchange: String,
    provider: Arc<MultiProvider>,
    gating_engine: GatingEngine,
    scoring_engine: ScoringEngine,
    quality_adjuster: QualityAdjuster,
    lock: Arc<StripedLock>,
}

impl AdHocService {
    pub fn new(
        store: RelationalStore,
        default_exchange: impl Into<String>,
        provider: Arc<MultiProvider>,
        quality_adjuster: QualityAdjuster,
        lock: Arc<StripedLock>,
    ) -> Self {
        Self {
            store,
            default_exchange: default_exchange.into(),
            provider,
            gating_engine: GatingEngine::with_defaults(),
            scoring_engine: ScoringEngine::new(),
            quality_adjuster,
            lock,
        }
    }

    /// Resolves `raw_ticker` into `(asset_id, asset_type, scope)` (spec
    /// §4.11 step 1). Explicit `exchange`/`asset_type` arguments win
    /// over anything inferred from the ticker text.
    fn resolve(&self, req: &AdHocRequest) -> (String, AssetType, MarketScope) {
        let exchange = req.exchange.as_deref().unwrap_or(&self.default_exchange);
        let asset_id = symbol::normalize(&req.raw_ticker, exchange);
        let asset_type = req.asset_type.unwrap_or_else(|| symbol::classify_asset_type(&asset_id));
        let exchange_code = asset_id.rsplit_once('.').map(|(_, e)| e).unwrap_or(exchange);
        let scope = symbol::scope_for_exchange(exchange_code);
        (asset_id, asset_type, scope)
    }

    pub async fn score_ticker(&self, bar_stores: &[(MarketScope, &ColumnarBarStore)], req: AdHocRequest) -> Result<AdHocResult> {
        let (asset_id, asset_type, scope) = self.resolve(&req);
        info!(asset_id, user_id = %req.user_id, "ad-hoc score requested");

        let _guard = self.lock.lock(&asset_id).await;

        if !req.force_refresh {
            if let Some(cached) = self.store.get_score(&asset_id).await? {
                let age = Utc::now().signed_duration_since(cached.computed_at);
                if age.to_std().unwrap_or(Duration::MAX) < CACHE_FRESHNESS {
                    let was_in_universe = self.store.get_asset(&asset_id).await?.is_some();
                    return Ok(AdHocResult {
                        asset_id,
                        score: cached,
                        data_source: "cache",
                        was_in_universe,
                        added_to_universe: false,
                        served_from_cache: true,
                    });
                }
            }
        }

        let existing_asset = self.store.get_asset(&asset_id).await?;
        let was_in_universe = existing_asset.is_some();

        let quota = self.store.get_user_quota(&req.user_id, req.plan).await?;
        if !req.plan.bypasses_quota() && quota.exhausted() {
            return Err(AppError::QuotaExceeded);
        }

        let (series, data_source) = self.fetch_history(&asset_id).await?;
        if series.len() < MIN_USABLE_BARS {
            return Err(AppError::InsufficientData(format!(
                "{asset_id} has {} bars, need at least {MIN_USABLE_BARS}",
                series.len()
            )));
        }

        let bar_store = bar_stores
            .iter()
            .find(|(s, _)| *s == scope)
            .map(|(_, store)| *store)
            .ok_or_else(|| AppError::Internal(format!("no bar store configured for scope {scope}")))?;
        bar_store.upsert(&asset_id, series.clone())?;

        let asset = existing_asset.unwrap_or_else(|| {
            Asset::new(asset_id.clone(), req.raw_ticker.clone(), req.raw_ticker.clone(), asset_type, scope, "adhoc", "USD")
        });

        let gating = self.gating_engine.evaluate(&asset, &series);

        let fundamentals = if asset_type.has_value_pillar() {
            self.provider.fetch_fundamentals(&asset_id).await.ok()
        } else {
            None
        };

        let mut score = self.scoring_engine.compute(&asset, &series, fundamentals.as_ref(), Some(&gating));
        if scope == MarketScope::UsEu {
            score = self.quality_adjuster.apply(score, &gating);
        }

        let mut added_to_universe = false;
        if req.add_to_universe && !was_in_universe {
            let mut adhoc_asset = asset.clone();
            adhoc_asset.tier = 3;
            adhoc_asset.active = false;
            self.store.upsert_asset(&adhoc_asset, scope).await?;
            added_to_universe = true;
        }

        self.store.upsert_gating(&gating, scope).await?;
        self.store.upsert_score(&score, scope).await?;

        if !req.plan.bypasses_quota() {
            self.store.increment_usage(&req.user_id, req.plan).await?;
        }

        Ok(AdHocResult { asset_id, score, data_source, was_in_universe, added_to_universe, served_from_cache: false })
    }

    /// Primary first, falling back on `QuotaExhausted` (spec §4.3
    /// "Inside ad-hoc scoring, primary is tried first, on authenticated
    /// quota errors the fallback is used").
    async fn fetch_history(&self, asset_id: &str) -> Result<(crate::domain::bar::BarSeries, &'static str)> {
        match self.provider.fetch_daily_history_with(ProviderSelection::PrimaryOnly, asset_id, ADHOC_FETCH_DAYS).await {
            Ok(series) => Ok((series, "primary")),
            Err(ProviderError::QuotaExhausted) | Err(ProviderError::RateLimited) => {
                warn!(asset_id, "primary exhausted, falling back for ad-hoc scoring");
                let series = self
                    .provider
                    .fetch_daily_history_with(ProviderSelection::FallbackOnly, asset_id, ADHOC_FETCH_DAYS)
                    .await
                    .map_err(provider_err_to_app_err)?;
                Ok((series, "fallback"))
            }
            Err(ProviderError::NotFound) => Err(AppError::AssetNotFound(asset_id.to_string())),
            Err(e) => Err(provider_err_to_app_err(e)),
        }
    }
}

fn provider_err_to_app_err(e: ProviderError) -> AppError {
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
    use crate::domain::bar::BarRow;
    use crate::domain::fundamentals::Fundamentals;
    use crate::external::price_provider::{BulkEodRow, ExchangeListing, Health, HealthState, PriceProvider};
    use async_trait::async_trait;

    struct FakeProvider {
        bar_count: usize,
    }

    #[async_trait]
    impl PriceProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_daily_history(&self, _asset_id: &str, _days: u32) -> Result<crate::domain::bar::BarSeries, ProviderError> {
            let rows: Vec<_> = (0..self.bar_count)
                .rev()
                .map(|i| {
                    let date = Utc::now().date_naive() - chrono::Duration::days(i as i64);
                    let close = 50.0 + (self.bar_count - i) as f64 * 0.1;
                    BarRow { date, open: close, high: close, low: close, close, volume: 500_000.0, adj_close: Some(close) }
                })
                .collect();
            Ok(crate::domain::bar::BarSeries::new(rows))
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
            Health { state: HealthState::Healthy, latency: Duration::ZERO }
        }
    }

    async fn service(bar_count: usize) -> AdHocService {
        let store = RelationalStore::connect(":memory:").await.unwrap();
        let provider = Arc::new(MultiProvider::new(Some(Arc::new(FakeProvider { bar_count })), None));
        AdHocService::new(store, "US", provider, QualityAdjuster::new(), Arc::new(StripedLock::new(4)))
    }

    fn req(ticker: &str, user: &str, plan: Plan) -> AdHocRequest {
        AdHocRequest {
            raw_ticker: ticker.to_string(),
            exchange: None,
            asset_type: None,
            force_refresh: true,
            add_to_universe: false,
            user_id: user.to_string(),
            plan,
        }
    }

    #[tokio::test]
    async fn insufficient_bars_is_a_typed_failure() {
        let svc = service(10).await;
        let dir = tempfile::tempdir().unwrap();
        let bar_store = ColumnarBarStore::new(dir.path(), MarketScope::UsEu).unwrap();
        let result = svc.score_ticker(&[(MarketScope::UsEu, &bar_store)], req("AAPL", "u1", Plan::Free)).await;
        assert!(matches!(result, Err(AppError::InsufficientData(_))));
    }

    #[tokio::test]
    async fn free_plan_quota_exhausts_after_three_calls() {
        let svc = service(300).await;
        let dir = tempfile::tempdir().unwrap();
        let bar_store = ColumnarBarStore::new(dir.path(), MarketScope::UsEu).unwrap();
        let stores = [(MarketScope::UsEu, &bar_store)];

        for _ in 0..3 {
            let result = svc.score_ticker(&stores, req("AAPL", "u2", Plan::Free)).await;
            assert!(result.is_ok());
        }

        let fourth = svc.score_ticker(&stores, req("AAPL", "u2", Plan::Free)).await;
        assert!(matches!(fourth, Err(AppError::QuotaExceeded)));
    }

    #[tokio::test]
    async fn annual_plan_bypasses_quota() {
        let svc = service(300).await;
        let dir = tempfile::tempdir().unwrap();
        let bar_store = ColumnarBarStore::new(dir.path(), MarketScope::UsEu).unwrap();
        let stores = [(MarketScope::UsEu, &bar_store)];

        for _ in 0..5 {
            let result = svc.score_ticker(&stores, req("AAPL", "u3", Plan::Yearly)).await;
            assert!(result.is_ok());
        }
    }
}
