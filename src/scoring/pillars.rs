use crate::domain::fundamentals::Fundamentals;
use crate::scoring::normalize::{normalize, rsi_shaped_score};

/// Momentum = average of available {RSI-shaped score, normalized
/// price-vs-SMA200} (spec §4.6).
pub fn momentum_score(rsi: Option<f64>, price_vs_sma200_pct: Option<f64>) -> Option<f64> {
    let mut parts = Vec::with_capacity(2);
    if let Some(r) = rsi {
        parts.push(rsi_shaped_score(r));
    }
    if let Some(p) = price_vs_sma200_pct {
        parts.push(normalize(p, -20.0, 20.0, false));
    }
    average(&parts)
}

/// Safety = average of available {inverted vol_annual ∈ [5,50]%,
/// inverted max_drawdown ∈ [0,40]%} (spec §4.6).
pub fn safety_score(vol_annual_pct: Option<f64>, max_drawdown_pct: Option<f64>) -> Option<f64> {
    let mut parts = Vec::with_capacity(2);
    if let Some(v) = vol_annual_pct {
        parts.push(normalize(v, 5.0, 50.0, true));
    }
    if let Some(d) = max_drawdown_pct {
        parts.push(normalize(d, 0.0, 40.0, true));
    }
    average(&parts)
}

/// Value = average of available {inverted P/E ∈ [5,50], normalized
/// profit margin ∈ [0,30]%, normalized ROE ∈ [0,25]%} (spec §4.6).
/// `None` when no fundamentals are available at all.
pub fn value_score(fundamentals: Option<&Fundamentals>) -> Option<f64> {
    let f = fundamentals?;
    let mut parts = Vec::with_capacity(3);
    if let Some(pe) = f.pe_ratio {
        parts.push(normalize(pe, 5.0, 50.0, true));
    }
    if let Some(margin) = f.profit_margin_pct {
        parts.push(normalize(margin, 0.0, 30.0, false));
    }
    if let Some(roe) = f.roe_pct {
        parts.push(normalize(roe, 0.0, 25.0, false));
    }
    average(&parts)
}

/// `(1 - fx_risk_raw) * 100` (spec §4.6, AFRICA only).
pub fn fx_risk_score(fx_risk_raw: Option<f64>) -> Option<f64> {
    fx_risk_raw.map(|raw| (1.0 - raw).clamp(0.0, 1.0) * 100.0)
}

/// Inverted tier-based composite boosted by ADV (spec §4.6, AFRICA
/// only). `liquidity_risk` already folds tier and ADV together
/// (`GatingEngine::evaluate`), so this is its direct inversion.
pub fn liquidity_risk_score(liquidity_risk: Option<f64>) -> Option<f64> {
    liquidity_risk.map(|risk| (1.0 - risk).clamp(0.0, 1.0) * 100.0)
}

fn average(parts: &[f64]) -> Option<f64> {
    if parts.is_empty() {
        return None;
    }
    Some(parts.iter().sum::<f64>() / parts.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn momentum_averages_available_components() {
        let score = momentum_score(Some(55.0), Some(0.0)).unwrap();
        assert!((score - 100.0).abs() < 1e-6);
    }

    #[test]
    fn momentum_is_none_with_no_inputs() {
        assert_eq!(momentum_score(None, None), None);
    }

    #[test]
    fn value_requires_fundamentals() {
        assert_eq!(value_score(None), None);
    }

    #[test]
    fn value_averages_available_fields() {
        let f = Fundamentals { pe_ratio: Some(20.0), profit_margin_pct: None, roe_pct: None, ..Fundamentals::empty() };
        let score = value_score(Some(&f)).unwrap();
        assert_eq!(score, normalize(20.0, 5.0, 50.0, true));
    }
}
