use crate::domain::bar::{BarRow, BarSeries};
use crate::domain::fundamentals::Fundamentals;
use crate::external::price_provider::{
    BulkEodRow, ExchangeListing, Health, HealthState, PriceProvider, ProviderError,
};
use crate::external::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Free fallback provider: EOD history and a thin fundamentals
/// surface, no search and no bulk-exchange listing (spec §4.3). Used
/// only when the primary is exhausted or explicitly not configured.
/// Request shape grounded on the teacher's `yahoofinance.rs` chart
/// endpoint.
pub struct FallbackProvider {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl FallbackProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            limiter: RateLimiter::new(2, Duration::from_millis(500)),
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("FALLBACK_PROVIDER_BASE_URL")
            .unwrap_or_else(|_| "https://query1.finance.yahoo.com".to_string());
        Self::new(base_url)
    }

    /// The free provider speaks a different symbol dialect than our
    /// `<symbol>.<exchange>` asset id; translate at the edge rather
    /// than polluting the asset id grammar (spec §4.3).
    fn translate_symbol(asset_id: &str) -> String {
        match asset_id.rsplit_once('.') {
            Some((symbol, "US")) => symbol.to_string(),
            Some((symbol, exchange)) => format!("{symbol}.{}", fallback_exchange_suffix(exchange)),
            None => asset_id.to_string(),
        }
    }
}

fn fallback_exchange_suffix(exchange_code: &str) -> &'static str {
    match exchange_code {
        "LSE" => "L",
        "PA" => "PA",
        "XETRA" => "DE",
        "AS" => "AS",
        "MI" => "MI",
        "SW" => "SW",
        "JSE" => "JO",
        _ => "",
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
    #[serde(default)]
    adjclose: Vec<ChartAdjClose>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartAdjClose {
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    result: Option<Vec<SummaryResult>>,
}

#[derive(Debug, Deserialize)]
struct SummaryResult {
    #[serde(rename = "summaryDetail")]
    summary_detail: Option<SummaryDetail>,
    #[serde(rename = "defaultKeyStatistics")]
    key_stats: Option<KeyStatistics>,
    #[serde(rename = "financialData")]
    financial_data: Option<FinancialData>,
}

#[derive(Debug, Deserialize)]
struct SummaryDetail {
    #[serde(rename = "marketCap")]
    market_cap: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
struct KeyStatistics {
    #[serde(rename = "profitMargins")]
    profit_margins: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
struct FinancialData {
    #[serde(rename = "returnOnEquity")]
    return_on_equity: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
struct RawValue {
    raw: f64,
}

#[async_trait]
impl PriceProvider for FallbackProvider {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn fetch_daily_history(&self, asset_id: &str, days: u32) -> Result<BarSeries, ProviderError> {
        let symbol = Self::translate_symbol(asset_id);
        let range = match days {
            0..=30 => "1mo",
            31..=90 => "3mo",
            91..=180 => "6mo",
            181..=365 => "1y",
            _ => "5y",
        };
        let url = format!("{}/v8/finance/chart/{symbol}", self.base_url);

        let _permit = self.limiter.acquire().await;
        let resp = self
            .client
            .get(&url)
            .query(&[("range", range), ("interval", "1d")])
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound);
        }
        if !resp.status().is_success() {
            return Err(ProviderError::BadResponse(format!("status {}", resp.status())));
        }

        let body: ChartResponse = resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;

        if let Some(err) = body.chart.error {
            return match err.code.as_str() {
                "Not Found" => Err(ProviderError::NotFound),
                _ => Err(ProviderError::BadResponse(err.description)),
            };
        }

        let result = body
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| ProviderError::BadResponse("empty chart result".into()))?;

        let quote = result
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::BadResponse("missing quote block".into()))?;
        let adj = result.indicators.adjclose.into_iter().next();

        let mut rows = Vec::with_capacity(result.timestamp.len());
        for (i, ts) in result.timestamp.into_iter().enumerate() {
            let (Some(open), Some(high), Some(low), Some(close)) =
                (quote.open.get(i).copied().flatten(), quote.high.get(i).copied().flatten(), quote.low.get(i).copied().flatten(), quote.close.get(i).copied().flatten())
            else {
                continue;
            };
            let volume = quote.volume.get(i).copied().flatten().unwrap_or(0.0);
            let adj_close = adj.as_ref().and_then(|a| a.adjclose.get(i).copied().flatten());
            let date = Utc
                .timestamp_opt(ts, 0)
                .single()
                .ok_or_else(|| ProviderError::Parse("invalid timestamp".into()))?
                .date_naive();
            rows.push(BarRow { date, open, high, low, close, volume, adj_close });
        }

        Ok(BarSeries::new(rows))
    }

    async fn fetch_fundamentals(&self, asset_id: &str) -> Result<Fundamentals, ProviderError> {
        let symbol = Self::translate_symbol(asset_id);
        let url = format!("{}/v10/finance/quoteSummary/{symbol}", self.base_url);

        let _permit = self.limiter.acquire().await;
        let resp = self
            .client
            .get(&url)
            .query(&[("modules", "summaryDetail,defaultKeyStatistics,financialData")])
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(ProviderError::BadResponse(format!("status {}", resp.status())));
        }

        let body: SummaryResponse = resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        let result = body
            .quote_summary
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or(ProviderError::NotFound)?;

        Ok(Fundamentals {
            pe_ratio: None,
            profit_margin_pct: result
                .key_stats
                .and_then(|k| k.profit_margins)
                .map(|v| v.raw * 100.0),
            roe_pct: result
                .financial_data
                .and_then(|f| f.return_on_equity)
                .map(|v| v.raw * 100.0),
            market_cap: result.summary_detail.and_then(|s| s.market_cap).map(|v| v.raw),
            sector: None,
            updated_at: Utc::now(),
        })
    }

    async fn list_symbols(&self, _exchange_code: &str) -> Result<Vec<ExchangeListing>, ProviderError> {
        Err(ProviderError::Unsupported)
    }

    async fn bulk_eod(&self, _exchange_code: &str) -> Result<Vec<BulkEodRow>, ProviderError> {
        Err(ProviderError::Unsupported)
    }

    async fn health_check(&self) -> Health {
        let started = Instant::now();
        let url = format!("{}/v8/finance/chart/AAPL", self.base_url);
        let result = self.client.get(&url).timeout(Duration::from_secs(5)).send().await;
        let latency = started.elapsed();
        match result {
            Ok(resp) if resp.status().is_success() => Health { state: HealthState::Healthy, latency },
            Ok(_) => Health { state: HealthState::Degraded, latency },
            Err(_) => Health { state: HealthState::Down, latency },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_us_symbol_by_dropping_suffix() {
        assert_eq!(FallbackProvider::translate_symbol("AAPL.US"), "AAPL");
    }

    #[test]
    fn translates_known_exchange_suffix() {
        assert_eq!(FallbackProvider::translate_symbol("NPN.JSE"), "NPN.JO");
    }
}
