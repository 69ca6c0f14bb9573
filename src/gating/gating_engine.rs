use chrono::Utc;

use crate::domain::asset::{Asset, AssetType};
use crate::domain::bar::BarSeries;
use crate::domain::gating::GatingStatus;
use crate::domain::scope::MarketScope;

const US_EU_ADV_HARD_FLOOR: f64 = 250_000.0;
const AFRICA_ETF_ADV_FLOOR: f64 = 5_000_000.0;
const AFRICA_EQUITY_ADV_FLOOR: f64 = 2_000_000.0;
const AFRICA_DEFAULT_ADV_FLOOR: f64 = 50_000.0;

const STALE_RATIO_CEILING: f64 = 0.20;
const MIN_LOW_PRICE: f64 = 1.0;

/// Per-currency FX stability table for the AFRICA confidence/risk
/// composite (spec §4.5 "weighted composite including FX stability").
/// Values are relative volatility, 0 = stable, 1 = highly volatile.
fn fx_risk_for_currency(currency: &str) -> f64 {
    match currency.to_ascii_uppercase().as_str() {
        "ZAR" => 0.25,
        "EGP" => 0.60,
        "NGN" => 0.55,
        "KES" => 0.45,
        "USD" | "EUR" | "GBP" => 0.05,
        _ => 0.50,
    }
}

/// Computes coverage, liquidity, staleness, confidence and eligibility
/// for one asset against its cached bar series (spec §4.5).
pub struct GatingEngine {
    lookback_days: i64,
    africa_adv_floor: f64,
}

impl GatingEngine {
    pub fn new(lookback_days: i64, africa_adv_floor: f64) -> Self {
        Self { lookback_days, africa_adv_floor }
    }

    pub fn with_defaults() -> Self {
        Self::new(365, AFRICA_DEFAULT_ADV_FLOOR)
    }

    pub fn evaluate(&self, asset: &Asset, series: &BarSeries) -> GatingStatus {
        if series.is_empty() {
            return GatingStatus::no_data(asset.asset_id.clone(), asset.market_scope.clone());
        }

        let scope = asset.scope().unwrap_or(MarketScope::UsEu);
        let window = series.tail(60);

        let coverage = self.coverage(series);
        let adv_usd = mean_dollar_volume(window);
        let stale_ratio = stale_ratio(window);
        let zero_volume_ratio = zero_volume_ratio(window);
        let price_min = window.iter().map(|r| r.low).fold(f64::INFINITY, f64::min);
        let last_bar_date = series.last_date();

        let (eligible, reason, fx_risk, liquidity_risk, data_confidence) = match scope {
            MarketScope::UsEu => {
                let confidence = us_eu_confidence(coverage, adv_usd, stale_ratio, zero_volume_ratio);
                let (eligible, reason) = us_eu_eligibility(coverage, adv_usd, stale_ratio, price_min);
                (eligible, reason, None, None, confidence)
            }
            MarketScope::Africa => {
                let fx = fx_risk_for_currency(&asset.currency);
                let liq_risk = africa_liquidity_risk(asset, adv_usd);
                let confidence = africa_confidence(coverage, fx, liq_risk);
                let (eligible, reason) = africa_eligibility(
                    asset,
                    coverage,
                    adv_usd,
                    stale_ratio,
                    price_min,
                    self.africa_adv_floor,
                );
                (eligible, reason, Some(fx), Some(liq_risk), confidence)
            }
        };

        GatingStatus {
            asset_id: asset.asset_id.clone(),
            market_scope: asset.market_scope.clone(),
            coverage,
            liquidity: adv_usd,
            price_min: if price_min.is_finite() { price_min } else { 0.0 },
            stale_ratio,
            zero_volume_ratio,
            eligible,
            reason,
            data_confidence,
            fx_risk,
            liquidity_risk,
            last_bar_date,
            updated_at: Utc::now(),
        }
    }

    fn coverage(&self, series: &BarSeries) -> f64 {
        let expected = (self.lookback_days as f64 * 252.0 / 365.0).max(1.0);
        let cutoff = Utc::now().date_naive() - chrono::Duration::days(self.lookback_days);
        let valid = series.rows.iter().filter(|r| r.date >= cutoff).count() as f64;
        (valid / expected).min(1.0)
    }
}

fn mean_dollar_volume(window: &[crate::domain::bar::BarRow]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: f64 = window.iter().map(|r| r.close * r.volume).sum();
    sum / window.len() as f64
}

fn stale_ratio(window: &[crate::domain::bar::BarRow]) -> f64 {
    if window.len() < 2 {
        return 1.0;
    }
    let mut stale = 0usize;
    for pair in window.windows(2) {
        let prev = pair[0].close;
        let curr = pair[1].close;
        if prev != 0.0 && ((curr - prev) / prev).abs() < 0.0005 {
            stale += 1;
        }
    }
    stale as f64 / (window.len() - 1) as f64
}

fn zero_volume_ratio(window: &[crate::domain::bar::BarRow]) -> f64 {
    if window.is_empty() {
        return 1.0;
    }
    let zero = window.iter().filter(|r| r.volume == 0.0).count();
    zero as f64 / window.len() as f64
}

fn us_eu_confidence(coverage: f64, adv_usd: f64, stale_ratio: f64, zero_volume_ratio: f64) -> f64 {
    let coverage_penalty = ((0.85 - coverage) / 0.85).max(0.0) * 40.0;
    let adv_penalty = ((2_000_000.0 - adv_usd) / 2_000_000.0).max(0.0) * 30.0;
    let stale_penalty = ((stale_ratio - 0.05) / 0.95).max(0.0) * 15.0;
    let zero_vol_penalty = ((zero_volume_ratio - 0.02) / 0.98).max(0.0) * 15.0;
    (100.0 - coverage_penalty - adv_penalty - stale_penalty - zero_vol_penalty).clamp(5.0, 100.0)
}

fn africa_liquidity_risk(asset: &Asset, adv_usd: f64) -> f64 {
    let tier_factor = (asset.tier as f64 - 1.0) / 3.0;
    let adv_factor = (1.0 - (adv_usd / 1_000_000.0).min(1.0)).max(0.0);
    (tier_factor * 0.5 + adv_factor * 0.5).clamp(0.0, 1.0)
}

fn africa_confidence(coverage: f64, fx_risk: f64, liquidity_risk: f64) -> f64 {
    let score = coverage * 50.0 + (1.0 - fx_risk) * 25.0 + (1.0 - liquidity_risk) * 25.0;
    score.clamp(5.0, 100.0)
}

/// AFRICA's ADV floor differentiates by asset type (ETF $5M, equity $2M,
/// else the configured default floor); US_EU uses a flat hard floor for
/// every asset type (spec §4.5, `original_source/pipeline/gating.py`
/// `_check_eligibility`'s `else` branch is AFRICA, not US_EU).
fn africa_adv_floor_for(asset: &Asset, default_floor: f64) -> f64 {
    match asset.asset_type() {
        AssetType::Etf => AFRICA_ETF_ADV_FLOOR,
        AssetType::Equity => AFRICA_EQUITY_ADV_FLOOR,
        _ => default_floor,
    }
}

fn us_eu_eligibility(
    coverage: f64,
    adv_usd: f64,
    stale_ratio: f64,
    price_min: f64,
) -> (bool, Option<String>) {
    if coverage < 0.60 {
        return (false, Some("LOW_COVERAGE".to_string()));
    }
    if adv_usd < US_EU_ADV_HARD_FLOOR {
        return (false, Some("LOW_LIQUIDITY".to_string()));
    }
    if stale_ratio > STALE_RATIO_CEILING {
        return (false, Some("STALE_PRICES".to_string()));
    }
    if price_min < MIN_LOW_PRICE {
        return (false, Some("PENNY_STOCK".to_string()));
    }
    (true, None)
}

fn africa_eligibility(
    asset: &Asset,
    coverage: f64,
    adv_usd: f64,
    stale_ratio: f64,
    price_min: f64,
    default_floor: f64,
) -> (bool, Option<String>) {
    if coverage < 0.40 {
        return (false, Some("LOW_COVERAGE".to_string()));
    }
    let floor = africa_adv_floor_for(asset, default_floor);
    if adv_usd < floor {
        return (false, Some("LOW_LIQUIDITY".to_string()));
    }
    if stale_ratio > STALE_RATIO_CEILING {
        return (false, Some("STALE_PRICES".to_string()));
    }
    if price_min < MIN_LOW_PRICE {
        return (false, Some("PENNY_STOCK".to_string()));
    }
    (true, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::BarRow;

    fn bar(days_ago: i64, close: f64, volume: f64) -> BarRow {
        let date = Utc::now().date_naive() - chrono::Duration::days(days_ago);
        BarRow { date, open: close, high: close, low: close, close, volume, adj_close: Some(close) }
    }

    fn liquid_series() -> BarSeries {
        let rows: Vec<BarRow> = (0..260).rev().map(|i| bar(i, 100.0 + (i % 5) as f64, 50_000.0)).collect();
        BarSeries::new(rows)
    }

    #[test]
    fn empty_series_is_no_data() {
        let asset = Asset::new("AAPL.US", "AAPL", "Apple", AssetType::Equity, MarketScope::UsEu, "US", "USD");
        let engine = GatingEngine::with_defaults();
        let status = engine.evaluate(&asset, &BarSeries::default());
        assert!(!status.eligible);
        assert_eq!(status.reason.as_deref(), Some("NO_DATA"));
    }

    #[test]
    fn liquid_us_eu_equity_is_eligible() {
        let mut asset = Asset::new("AAPL.US", "AAPL", "Apple", AssetType::Equity, MarketScope::UsEu, "US", "USD");
        asset.tier = 1;
        let engine = GatingEngine::with_defaults();
        let status = engine.evaluate(&asset, &liquid_series());
        assert!(status.eligible, "reason: {:?}", status.reason);
    }

    #[test]
    fn penny_stock_is_ineligible() {
        let asset = Asset::new("PENNY.US", "PENNY", "Penny Co", AssetType::Equity, MarketScope::UsEu, "US", "USD");
        let rows: Vec<BarRow> = (0..260).rev().map(|i| bar(i, 0.50, 50_000.0)).collect();
        let engine = GatingEngine::with_defaults();
        let status = engine.evaluate(&asset, &BarSeries::new(rows));
        assert_eq!(status.reason.as_deref(), Some("PENNY_STOCK"));
    }

    #[test]
    fn coverage_windows_last_n_days_only() {
        let rows = vec![bar(400, 10.0, 100.0)];
        let engine = GatingEngine::with_defaults();
        let series = BarSeries::new(rows);
        assert_eq!(engine.coverage(&series), 0.0);
    }
}
