use crate::domain::bar::{BarRow, BarSeries};
use crate::domain::fundamentals::Fundamentals;
use crate::external::price_provider::{
    BulkEodRow, ExchangeListing, Health, HealthState, PriceProvider, ProviderError,
};
use crate::external::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Paid primary provider: symbol search, per-exchange listings,
/// per-symbol EOD, fundamentals, bulk-EOD-for-one-exchange (spec
/// §4.3). Request/response shapes are grounded on the teacher's
/// `alphavantage.rs`; the base URL and API key env vars follow the
/// EODHD-shaped recognized env-var set from spec §6.
pub struct PrimaryProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
    max_attempts: u32,
}

impl PrimaryProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            limiter: RateLimiter::new(4, Duration::from_millis(200)),
            max_attempts: 4,
        }
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("EODHD_API_KEY")
            .map_err(|_| ProviderError::AuthFailure("EODHD_API_KEY not set".into()))?;
        let base_url =
            std::env::var("EODHD_BASE_URL").unwrap_or_else(|_| "https://eodhd.com/api".to_string());
        Ok(Self::new(base_url, api_key))
    }

    /// Exponential backoff with a fixed maximum attempt count, retrying
    /// transient transport errors and rate-limit responses. Auth
    /// errors are non-retryable (spec §4.3).
    async fn with_retry<T, F, Fut>(&self, f: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let _permit = self.limiter.acquire().await;
            match f().await {
                Ok(v) => return Ok(v),
                Err(ProviderError::AuthFailure(msg)) => return Err(ProviderError::AuthFailure(msg)),
                Err(e @ (ProviderError::Network(_) | ProviderError::RateLimited)) => {
                    if attempt >= self.max_attempts {
                        return Err(e);
                    }
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt - 1));
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct EodRow {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    adjusted_close: Option<f64>,
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct FundamentalsResponse {
    #[serde(rename = "Highlights")]
    highlights: Option<Highlights>,
}

#[derive(Debug, Deserialize)]
struct Highlights {
    #[serde(rename = "PERatio")]
    pe_ratio: Option<f64>,
    #[serde(rename = "ProfitMargin")]
    profit_margin: Option<f64>,
    #[serde(rename = "ReturnOnEquityTTM")]
    roe: Option<f64>,
    #[serde(rename = "MarketCapitalization")]
    market_cap: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BulkRow {
    code: String,
    close: f64,
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct ListingRow {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Type")]
    asset_type: String,
    #[serde(rename = "Currency")]
    currency: String,
    #[serde(default, rename = "Country")]
    country: Option<String>,
}

fn classify_status(status: reqwest::StatusCode) -> Option<ProviderError> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Some(ProviderError::RateLimited)
    } else if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        Some(ProviderError::AuthFailure(format!("status {status}")))
    } else if status == reqwest::StatusCode::PAYMENT_REQUIRED {
        Some(ProviderError::QuotaExhausted)
    } else if status == reqwest::StatusCode::NOT_FOUND {
        Some(ProviderError::NotFound)
    } else if !status.is_success() {
        Some(ProviderError::Network(format!("status {status}")))
    } else {
        None
    }
}

#[async_trait]
impl PriceProvider for PrimaryProvider {
    fn name(&self) -> &'static str {
        "primary"
    }

    async fn fetch_daily_history(&self, asset_id: &str, days: u32) -> Result<BarSeries, ProviderError> {
        let symbol = asset_id.to_string();
        let url = format!("{}/eod/{symbol}", self.base_url);
        let api_key = self.api_key.clone();
        let client = self.client.clone();

        let rows: Vec<EodRow> = self
            .with_retry(|| {
                let url = url.clone();
                let api_key = api_key.clone();
                let client = client.clone();
                async move {
                    let resp = client
                        .get(&url)
                        .query(&[("api_token", api_key.as_str()), ("fmt", "json"), ("period", "d")])
                        .send()
                        .await
                        .map_err(|e| ProviderError::Network(e.to_string()))?;

                    if let Some(err) = classify_status(resp.status()) {
                        return Err(err);
                    }

                    resp.json::<Vec<EodRow>>().await.map_err(|e| ProviderError::Parse(e.to_string()))
                }
            })
            .await?;

        let mut bar_rows = Vec::with_capacity(rows.len());
        for r in rows {
            let date = NaiveDate::parse_from_str(&r.date, "%Y-%m-%d")
                .map_err(|e| ProviderError::Parse(e.to_string()))?;
            bar_rows.push(BarRow {
                date,
                open: r.open,
                high: r.high,
                low: r.low,
                close: r.close,
                volume: r.volume,
                adj_close: r.adjusted_close,
            });
        }

        let mut series = BarSeries::new(bar_rows);
        if days > 0 && series.rows.len() > days as usize {
            let start = series.rows.len() - days as usize;
            series.rows.drain(..start);
        }
        Ok(series)
    }

    async fn fetch_fundamentals(&self, asset_id: &str) -> Result<Fundamentals, ProviderError> {
        let symbol = asset_id.to_string();
        let url = format!("{}/fundamentals/{symbol}", self.base_url);
        let api_key = self.api_key.clone();
        let client = self.client.clone();

        let resp: FundamentalsResponse = self
            .with_retry(|| {
                let url = url.clone();
                let api_key = api_key.clone();
                let client = client.clone();
                async move {
                    let resp = client
                        .get(&url)
                        .query(&[("api_token", api_key.as_str()), ("fmt", "json")])
                        .send()
                        .await
                        .map_err(|e| ProviderError::Network(e.to_string()))?;
                    if let Some(err) = classify_status(resp.status()) {
                        return Err(err);
                    }
                    resp.json::<FundamentalsResponse>().await.map_err(|e| ProviderError::Parse(e.to_string()))
                }
            })
            .await?;

        let h = resp.highlights.unwrap_or(Highlights {
            pe_ratio: None,
            profit_margin: None,
            roe: None,
            market_cap: None,
        });

        Ok(Fundamentals {
            pe_ratio: h.pe_ratio,
            profit_margin_pct: h.profit_margin.map(|v| v * 100.0),
            roe_pct: h.roe.map(|v| v * 100.0),
            market_cap: h.market_cap,
            sector: None,
            updated_at: Utc::now(),
        })
    }

    async fn list_symbols(&self, exchange_code: &str) -> Result<Vec<ExchangeListing>, ProviderError> {
        let url = format!("{}/exchange-symbol-list/{exchange_code}", self.base_url);
        let api_key = self.api_key.clone();
        let client = self.client.clone();

        let rows: Vec<ListingRow> = self
            .with_retry(|| {
                let url = url.clone();
                let api_key = api_key.clone();
                let client = client.clone();
                async move {
                    let resp = client
                        .get(&url)
                        .query(&[("api_token", api_key.as_str()), ("fmt", "json")])
                        .send()
                        .await
                        .map_err(|e| ProviderError::Network(e.to_string()))?;
                    if let Some(err) = classify_status(resp.status()) {
                        return Err(err);
                    }
                    resp.json::<Vec<ListingRow>>().await.map_err(|e| ProviderError::Parse(e.to_string()))
                }
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| ExchangeListing {
                symbol: r.code,
                name: r.name,
                asset_type: r.asset_type,
                currency: r.currency,
                country: r.country,
            })
            .collect())
    }

    async fn bulk_eod(&self, exchange_code: &str) -> Result<Vec<BulkEodRow>, ProviderError> {
        let url = format!("{}/eod-bulk-last-day/{exchange_code}", self.base_url);
        let api_key = self.api_key.clone();
        let client = self.client.clone();

        let rows: Vec<BulkRow> = self
            .with_retry(|| {
                let url = url.clone();
                let api_key = api_key.clone();
                let client = client.clone();
                async move {
                    let resp = client
                        .get(&url)
                        .query(&[("api_token", api_key.as_str()), ("fmt", "json")])
                        .send()
                        .await
                        .map_err(|e| ProviderError::Network(e.to_string()))?;
                    if let Some(err) = classify_status(resp.status()) {
                        return Err(err);
                    }
                    resp.json::<Vec<BulkRow>>().await.map_err(|e| ProviderError::Parse(e.to_string()))
                }
            })
            .await?;

        Ok(rows.into_iter().map(|r| BulkEodRow { symbol: r.code, close: r.close, volume: r.volume }).collect())
    }

    async fn search(&self, keyword: &str) -> Result<Vec<ExchangeListing>, ProviderError> {
        let url = format!("{}/search/{keyword}", self.base_url);
        let api_key = self.api_key.clone();
        let client = self.client.clone();

        let rows: Vec<ListingRow> = self
            .with_retry(|| {
                let url = url.clone();
                let api_key = api_key.clone();
                let client = client.clone();
                async move {
                    let resp = client
                        .get(&url)
                        .query(&[("api_token", api_key.as_str())])
                        .send()
                        .await
                        .map_err(|e| ProviderError::Network(e.to_string()))?;
                    if let Some(err) = classify_status(resp.status()) {
                        return Err(err);
                    }
                    resp.json::<Vec<ListingRow>>().await.map_err(|e| ProviderError::Parse(e.to_string()))
                }
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| ExchangeListing {
                symbol: r.code,
                name: r.name,
                asset_type: r.asset_type,
                currency: r.currency,
                country: r.country,
            })
            .collect())
    }

    async fn health_check(&self) -> Health {
        let started = Instant::now();
        let url = format!("{}/eod/AAPL.US", self.base_url);
        let result = self
            .client
            .get(&url)
            .query(&[("api_token", self.api_key.as_str()), ("fmt", "json")])
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        let latency = started.elapsed();
        match result {
            Ok(resp) if resp.status().is_success() => Health { state: HealthState::Healthy, latency },
            Ok(_) => Health { state: HealthState::Degraded, latency },
            Err(_) => Health { state: HealthState::Down, latency },
        }
    }
}
