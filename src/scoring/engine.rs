use chrono::Utc;
use std::collections::BTreeMap;

use crate::domain::asset::Asset;
use crate::domain::bar::BarSeries;
use crate::domain::fundamentals::Fundamentals;
use crate::domain::gating::GatingStatus;
use crate::domain::score::{
    FeatureMap, FeatureName, PillarWeights, Score, ScoreBreakdown, StateLabel, ENGINE_VERSION,
};
use crate::scoring::{confidence, indicators, pillars, state_label, weights};

/// Fewer than this many usable bars and `score_total` is forced to
/// `NULL` regardless of what the pillars computed (spec §3 invariant,
/// spec §8 "Exactly 49 bars: ineligible... 50 bars: eligible").
pub const MIN_USABLE_BARS: usize = 50;

/// Computes pillar and total scores from bars + optional fundamentals
/// + optional gating (spec §4.6). Stateless: every call is pure given
/// its inputs, so a rotation run and an ad-hoc `scoreTicker` call
/// share this one engine without any shared mutable state.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(
        &self,
        asset: &Asset,
        bars: &BarSeries,
        fundamentals: Option<&Fundamentals>,
        gating: Option<&GatingStatus>,
    ) -> Score {
        let closes = bars.closes();

        let rsi = indicators::rsi(&closes, 14);
        let sma50 = indicators::sma(&closes, 50).last().copied().flatten();
        let sma200 = indicators::sma(&closes, 200).last().copied().flatten();
        let price_vs_sma200 = indicators::price_vs_sma(&closes, 200);
        let zscore = indicators::zscore(&closes, 20);
        let vol_annual = indicators::volatility_annual(&closes);
        let max_drawdown = indicators::max_drawdown(&closes, 252);
        let last_price = closes.last().copied();

        let has_value_pillar = asset.asset_type().has_value_pillar();
        let is_africa = asset.scope() == Some(crate::domain::scope::MarketScope::Africa);

        let momentum = pillars::momentum_score(rsi, price_vs_sma200);
        let safety = pillars::safety_score(vol_annual, max_drawdown);
        let value = if has_value_pillar { pillars::value_score(fundamentals) } else { None };
        let fx_risk_pillar = if is_africa { pillars::fx_risk_score(gating.and_then(|g| g.fx_risk)) } else { None };
        let liquidity_risk_pillar =
            if is_africa { pillars::liquidity_risk_score(gating.and_then(|g| g.liquidity_risk)) } else { None };

        let base = weights::base_weights(asset.scope().unwrap_or(crate::domain::scope::MarketScope::UsEu), asset.asset_type());
        let resolved_weights = weights::redistribute(
            base,
            momentum.is_some(),
            safety.is_some(),
            value.is_some(),
            fx_risk_pillar.is_some(),
            liquidity_risk_pillar.is_some(),
        );

        let score_total_raw = weighted_sum(&resolved_weights, momentum, safety, value, fx_risk_pillar, liquidity_risk_pillar);

        let pillars_total = if is_africa { 5 } else if has_value_pillar { 3 } else { 2 };
        let pillars_active = [momentum.is_some(), safety.is_some(), value.is_some(), fx_risk_pillar.is_some(), liquidity_risk_pillar.is_some()]
            .iter()
            .filter(|&&present| present)
            .count();
        let (confidence, confidence_components) =
            confidence::compute(gating, bars.last_date(), pillars_active, pillars_total);

        let state = state_label::classify(zscore, rsi);

        let eligible = gating.map(|g| g.eligible).unwrap_or(false);
        let score_total = if bars.len() < MIN_USABLE_BARS || !eligible { None } else { score_total_raw };

        let raw_features = build_feature_map(
            rsi, sma50, sma200, price_vs_sma200, zscore, vol_annual, max_drawdown, fundamentals, gating,
        );

        let breakdown = ScoreBreakdown {
            engine_version: ENGINE_VERSION,
            computed_at: Utc::now(),
            weights: resolved_weights,
            raw_features,
            pillar_momentum: momentum,
            pillar_safety: safety,
            pillar_value: value,
            pillar_fx_risk: fx_risk_pillar,
            pillar_liquidity_risk: liquidity_risk_pillar,
            confidence_components,
            adjuster: None,
            extras: BTreeMap::new(),
        };

        Score {
            asset_id: asset.asset_id.clone(),
            market_scope: asset.market_scope.clone(),
            score_total,
            score_value: value,
            score_momentum: momentum,
            score_safety: safety,
            score_fx_risk: fx_risk_pillar,
            score_liquidity_risk: liquidity_risk_pillar,
            confidence,
            state_label: state,
            rsi,
            zscore,
            vol_annual,
            max_drawdown,
            sma200,
            last_price,
            fundamentals_available: fundamentals.is_some(),
            breakdown,
            computed_at: Utc::now(),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn weighted_sum(
    w: &PillarWeights,
    momentum: Option<f64>,
    safety: Option<f64>,
    value: Option<f64>,
    fx_risk: Option<f64>,
    liquidity_risk: Option<f64>,
) -> Option<f64> {
    if w.sum() <= 0.0 {
        return None;
    }
    let total = momentum.unwrap_or(0.0) * w.momentum
        + safety.unwrap_or(0.0) * w.safety
        + value.unwrap_or(0.0) * w.value
        + fx_risk.unwrap_or(0.0) * w.fx_risk
        + liquidity_risk.unwrap_or(0.0) * w.liquidity_risk;
    Some(total.clamp(0.0, 100.0))
}

#[allow(clippy::too_many_arguments)]
fn build_feature_map(
    rsi: Option<f64>,
    sma50: Option<f64>,
    sma200: Option<f64>,
    price_vs_sma200: Option<f64>,
    zscore: Option<f64>,
    vol_annual: Option<f64>,
    max_drawdown: Option<f64>,
    fundamentals: Option<&Fundamentals>,
    gating: Option<&GatingStatus>,
) -> FeatureMap {
    let mut map: FeatureMap = BTreeMap::new();
    if let Some(v) = rsi {
        map.insert(FeatureName::Rsi14, v);
    }
    if let Some(v) = sma50 {
        map.insert(FeatureName::Sma50, v);
    }
    if let Some(v) = sma200 {
        map.insert(FeatureName::Sma200, v);
    }
    if let Some(v) = price_vs_sma200 {
        map.insert(FeatureName::PriceVsSma200Pct, v);
    }
    if let Some(v) = zscore {
        map.insert(FeatureName::ZScore20, v);
    }
    if let Some(v) = vol_annual {
        map.insert(FeatureName::VolAnnualPct, v);
    }
    if let Some(v) = max_drawdown {
        map.insert(FeatureName::MaxDrawdownPct, v);
    }
    if let Some(f) = fundamentals {
        if let Some(v) = f.pe_ratio {
            map.insert(FeatureName::Pe, v);
        }
        if let Some(v) = f.profit_margin_pct {
            map.insert(FeatureName::ProfitMarginPct, v);
        }
        if let Some(v) = f.roe_pct {
            map.insert(FeatureName::RoePct, v);
        }
    }
    if let Some(g) = gating {
        if let Some(v) = g.fx_risk {
            map.insert(FeatureName::FxRiskRaw, v);
        }
        map.insert(FeatureName::AdvUsd, g.liquidity);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::AssetType;
    use crate::domain::bar::BarRow;
    use crate::domain::scope::MarketScope;

    fn bar(days_ago: i64, close: f64) -> BarRow {
        let date = Utc::now().date_naive() - chrono::Duration::days(days_ago);
        BarRow { date, open: close, high: close, low: close, close, volume: 10_000.0, adj_close: Some(close) }
    }

    fn uptrend_series(n: i64) -> BarSeries {
        let rows: Vec<BarRow> = (0..n).rev().map(|i| bar(i, 100.0 + (n - i) as f64 * 0.1)).collect();
        BarSeries::new(rows)
    }

    #[test]
    fn empty_bars_yields_null_score_and_na_label() {
        let asset = Asset::new("AAPL.US", "AAPL", "Apple", AssetType::Equity, MarketScope::UsEu, "US", "USD");
        let engine = ScoringEngine::new();
        let score = engine.compute(&asset, &BarSeries::default(), None, None);
        assert!(score.score_total.is_none());
        assert_eq!(score.state_label, StateLabel::Na);
    }

    #[test]
    fn eligible_equity_with_enough_bars_produces_bounded_score() {
        let asset = Asset::new("AAPL.US", "AAPL", "Apple", AssetType::Equity, MarketScope::UsEu, "US", "USD");
        let series = uptrend_series(300);
        let mut gating = GatingStatus::no_data("AAPL.US", "US_EU");
        gating.eligible = true;
        gating.coverage = 0.95;
        let engine = ScoringEngine::new();
        let score = engine.compute(&asset, &series, None, Some(&gating));

        let total = score.score_total.expect("score should be present");
        assert!((0.0..=100.0).contains(&total));
        assert!(score.confidence >= 0 && score.confidence <= 100);
    }

    #[test]
    fn ineligible_asset_has_null_score_total() {
        let asset = Asset::new("AAPL.US", "AAPL", "Apple", AssetType::Equity, MarketScope::UsEu, "US", "USD");
        let series = uptrend_series(300);
        let mut gating = GatingStatus::no_data("AAPL.US", "US_EU");
        gating.eligible = false;
        let engine = ScoringEngine::new();
        let score = engine.compute(&asset, &series, None, Some(&gating));
        assert!(score.score_total.is_none());
    }

    #[test]
    fn weights_sum_to_one_in_breakdown_when_pillars_present() {
        let asset = Asset::new("SPY.US", "SPY", "SPDR S&P 500", AssetType::Etf, MarketScope::UsEu, "US", "USD");
        let series = uptrend_series(300);
        let mut gating = GatingStatus::no_data("SPY.US", "US_EU");
        gating.eligible = true;
        let engine = ScoringEngine::new();
        let score = engine.compute(&asset, &series, None, Some(&gating));
        assert!((score.breakdown.weights.sum() - 1.0).abs() < 1e-9);
    }
}
