use crate::domain::bar::BarSeries;
use crate::domain::fundamentals::Fundamentals;
use crate::external::failure_cache::{FailureCache, FailureType};
use crate::external::price_provider::{
    BulkEodRow, ExchangeListing, Health, HealthState, PriceProvider, ProviderError,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Explicit selection policy for a single call (spec §4.3: `auto`
/// tries primary then falls back only on `QuotaExhausted`/`RateLimited`;
/// the explicit variants bypass the policy for callers that already
/// know which provider they need, e.g. ad-hoc search).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSelection {
    Auto,
    PrimaryOnly,
    FallbackOnly,
}

/// Composes the primary and fallback adapters behind one
/// `PriceProvider` surface. Each adapter owns its own rate limiter
/// (spec §5); this layer only owns the shared failure cache so a
/// known-dead asset doesn't pay for two round trips every call.
pub struct MultiProvider {
    primary: Option<Arc<dyn PriceProvider>>,
    fallback: Option<Arc<dyn PriceProvider>>,
    failures: FailureCache,
}

impl MultiProvider {
    pub fn new(primary: Option<Arc<dyn PriceProvider>>, fallback: Option<Arc<dyn PriceProvider>>) -> Self {
        Self { primary, fallback, failures: FailureCache::new() }
    }

    pub fn failure_cache(&self) -> &FailureCache {
        &self.failures
    }

    fn failure_type_for(err: &ProviderError) -> FailureType {
        match err {
            ProviderError::NotFound => FailureType::NotFound,
            ProviderError::RateLimited | ProviderError::QuotaExhausted => FailureType::RateLimited,
            _ => FailureType::ApiError,
        }
    }

    fn should_fall_back(err: &ProviderError) -> bool {
        matches!(err, ProviderError::QuotaExhausted | ProviderError::RateLimited | ProviderError::Unsupported)
    }

    async fn run<T, F, Fut>(&self, selection: ProviderSelection, asset_id: &str, op: F) -> Result<T, ProviderError>
    where
        F: Fn(Arc<dyn PriceProvider>) -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        if let Some(info) = self.failures.is_failed(asset_id) {
            debug!(asset_id, error_type = ?info.error_type, "skipping known-failing asset");
            return Err(ProviderError::NotFound);
        }

        let try_primary = selection != ProviderSelection::FallbackOnly;
        let try_fallback = selection != ProviderSelection::PrimaryOnly;

        if try_primary {
            if let Some(primary) = &self.primary {
                match op(primary.clone()).await {
                    Ok(v) => return Ok(v),
                    Err(e) if selection == ProviderSelection::Auto && try_fallback && Self::should_fall_back(&e) => {
                        warn!(asset_id, provider = "primary", error = %e, "falling back");
                    }
                    Err(e) => {
                        self.failures.record_failure(asset_id, Self::failure_type_for(&e));
                        return Err(e);
                    }
                }
            }
        }

        if try_fallback {
            if let Some(fallback) = &self.fallback {
                return op(fallback.clone()).await.map_err(|e| {
                    self.failures.record_failure(asset_id, Self::failure_type_for(&e));
                    e
                });
            }
        }

        Err(ProviderError::Unsupported)
    }

    pub async fn fetch_daily_history_with(
        &self,
        selection: ProviderSelection,
        asset_id: &str,
        days: u32,
    ) -> Result<BarSeries, ProviderError> {
        self.run(selection, asset_id, |p| {
            let asset_id = asset_id.to_string();
            async move { p.fetch_daily_history(&asset_id, days).await }
        })
        .await
    }

    pub async fn fetch_fundamentals_with(
        &self,
        selection: ProviderSelection,
        asset_id: &str,
    ) -> Result<Fundamentals, ProviderError> {
        self.run(selection, asset_id, |p| {
            let asset_id = asset_id.to_string();
            async move { p.fetch_fundamentals(&asset_id).await }
        })
        .await
    }
}

#[async_trait]
impl PriceProvider for MultiProvider {
    fn name(&self) -> &'static str {
        "multi"
    }

    async fn fetch_daily_history(&self, asset_id: &str, days: u32) -> Result<BarSeries, ProviderError> {
        self.fetch_daily_history_with(ProviderSelection::Auto, asset_id, days).await
    }

    async fn fetch_fundamentals(&self, asset_id: &str) -> Result<Fundamentals, ProviderError> {
        self.fetch_fundamentals_with(ProviderSelection::Auto, asset_id).await
    }

    async fn list_symbols(&self, exchange_code: &str) -> Result<Vec<ExchangeListing>, ProviderError> {
        match &self.primary {
            Some(p) => p.list_symbols(exchange_code).await,
            None => Err(ProviderError::Unsupported),
        }
    }

    async fn bulk_eod(&self, exchange_code: &str) -> Result<Vec<BulkEodRow>, ProviderError> {
        match &self.primary {
            Some(p) => p.bulk_eod(exchange_code).await,
            None => Err(ProviderError::Unsupported),
        }
    }

    async fn search(&self, keyword: &str) -> Result<Vec<ExchangeListing>, ProviderError> {
        match &self.primary {
            Some(p) => p.search(keyword).await,
            None => Err(ProviderError::Unsupported),
        }
    }

    async fn health_check(&self) -> Health {
        if let Some(primary) = &self.primary {
            let h = primary.health_check().await;
            if h.state == HealthState::Healthy {
                return h;
            }
        }
        if let Some(fallback) = &self.fallback {
            return fallback.health_check().await;
        }
        Health { state: HealthState::Down, latency: Duration::ZERO }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider {
        name: &'static str,
        history: Result<BarSeries, ProviderError>,
    }

    #[async_trait]
    impl PriceProvider for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch_daily_history(&self, _asset_id: &str, _days: u32) -> Result<BarSeries, ProviderError> {
            self.history.clone()
        }

        async fn fetch_fundamentals(&self, _asset_id: &str) -> Result<Fundamentals, ProviderError> {
            Err(ProviderError::Unsupported)
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

    #[tokio::test]
    async fn auto_falls_back_on_quota_exhausted() {
        let primary = Arc::new(StubProvider { name: "primary", history: Err(ProviderError::QuotaExhausted) });
        let fallback = Arc::new(StubProvider { name: "fallback", history: Ok(BarSeries::new(vec![])) });
        let multi = MultiProvider::new(Some(primary), Some(fallback));

        let result = multi.fetch_daily_history_with(ProviderSelection::Auto, "AAPL.US", 30).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn primary_only_does_not_fall_back() {
        let primary = Arc::new(StubProvider { name: "primary", history: Err(ProviderError::QuotaExhausted) });
        let fallback = Arc::new(StubProvider { name: "fallback", history: Ok(BarSeries::new(vec![])) });
        let multi = MultiProvider::new(Some(primary), Some(fallback));

        let result = multi.fetch_daily_history_with(ProviderSelection::PrimaryOnly, "AAPL.US", 30).await;
        assert!(matches!(result, Err(ProviderError::QuotaExhausted)));
    }

    #[tokio::test]
    async fn non_retryable_error_does_not_fall_back() {
        let primary = Arc::new(StubProvider { name: "primary", history: Err(ProviderError::AuthFailure("bad key".into())) });
        let fallback = Arc::new(StubProvider { name: "fallback", history: Ok(BarSeries::new(vec![])) });
        let multi = MultiProvider::new(Some(primary), Some(fallback));

        let result = multi.fetch_daily_history_with(ProviderSelection::Auto, "AAPL.US", 30).await;
        assert!(matches!(result, Err(ProviderError::AuthFailure(_))));
    }
}
