use crate::domain::bar::BarSeries;
use crate::domain::fundamentals::Fundamentals;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// One row from a bulk-EOD-for-one-exchange call: enough to estimate
/// ADV without a per-asset round trip (spec §4.4 step 2-3).
#[derive(Debug, Clone)]
pub struct BulkEodRow {
    pub symbol: String,
    pub close: f64,
    pub volume: f64,
}

/// One row from a list-symbols call (spec §4.4 step 1).
#[derive(Debug, Clone)]
pub struct ExchangeListing {
    pub symbol: String,
    pub name: String,
    pub asset_type: String,
    pub currency: String,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Down,
}

#[derive(Debug, Clone)]
pub struct Health {
    pub state: HealthState,
    pub latency: Duration,
}

/// Errors an adapter implementation raises internally; callers (job
/// runner, ad-hoc service) translate these into `AppError` variants at
/// the call boundary (spec §7).
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("quota exhausted")]
    QuotaExhausted,

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("ticker not found")]
    NotFound,

    #[error("unsupported operation")]
    Unsupported,
}

/// Abstracts the external market-data source (spec §4.3). Two
/// concrete implementations: a paid primary with full coverage, and a
/// free fallback with EOD + fundamentals only.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_daily_history(&self, asset_id: &str, days: u32) -> Result<BarSeries, ProviderError>;

    async fn fetch_fundamentals(&self, asset_id: &str) -> Result<Fundamentals, ProviderError>;

    async fn list_symbols(&self, exchange_code: &str) -> Result<Vec<ExchangeListing>, ProviderError>;

    async fn bulk_eod(&self, exchange_code: &str) -> Result<Vec<BulkEodRow>, ProviderError>;

    async fn search(&self, keyword: &str) -> Result<Vec<ExchangeListing>, ProviderError> {
        let _ = keyword;
        Err(ProviderError::Unsupported)
    }

    async fn health_check(&self) -> Health;
}
