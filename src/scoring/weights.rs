use crate::domain::asset::AssetType;
use crate::domain::score::PillarWeights;
use crate::domain::scope::MarketScope;

/// Base weights per asset type before any redistribution for pillars
/// with no value (spec §4.6 "Weighting" table).
pub fn base_weights(scope: MarketScope, asset_type: AssetType) -> PillarWeights {
    use AssetType::*;
    use MarketScope::*;

    match (scope, asset_type) {
        (UsEu, Equity) | (UsEu, Fund) => {
            PillarWeights { momentum: 0.40, safety: 0.30, value: 0.30, fx_risk: 0.0, liquidity_risk: 0.0 }
        }
        (UsEu, Etf) => PillarWeights { momentum: 0.60, safety: 0.40, value: 0.0, fx_risk: 0.0, liquidity_risk: 0.0 },
        (Africa, Equity) | (Africa, Fund) => PillarWeights {
            momentum: 0.35,
            safety: 0.25,
            value: 0.20,
            fx_risk: 0.10,
            liquidity_risk: 0.10,
        },
        (Africa, Etf) => {
            PillarWeights { momentum: 0.40, safety: 0.30, value: 0.0, fx_risk: 0.15, liquidity_risk: 0.15 }
        }
        (Africa, Bond) => {
            PillarWeights { momentum: 0.25, safety: 0.45, value: 0.10, fx_risk: 0.10, liquidity_risk: 0.10 }
        }
        // Alternative asset types (FX/crypto/commodity/option/future) and any
        // remaining combination: momentum+safety-only model (spec §4.6).
        _ => PillarWeights { momentum: 0.60, safety: 0.40, value: 0.0, fx_risk: 0.0, liquidity_risk: 0.0 },
    }
}

/// Redistributes weight proportionally across whichever pillars have
/// an actual value, so the active subset still sums to 1 (spec §4.6:
/// "If a pillar has no value... its weight is redistributed
/// proportionally across active pillars before the weighted sum").
pub fn redistribute(
    base: PillarWeights,
    momentum_present: bool,
    safety_present: bool,
    value_present: bool,
    fx_present: bool,
    liquidity_present: bool,
) -> PillarWeights {
    let active_sum = (if momentum_present { base.momentum } else { 0.0 })
        + (if safety_present { base.safety } else { 0.0 })
        + (if value_present { base.value } else { 0.0 })
        + (if fx_present { base.fx_risk } else { 0.0 })
        + (if liquidity_present { base.liquidity_risk } else { 0.0 });

    if active_sum <= 0.0 {
        return PillarWeights { momentum: 0.0, safety: 0.0, value: 0.0, fx_risk: 0.0, liquidity_risk: 0.0 };
    }

    let scale = 1.0 / active_sum;
    PillarWeights {
        momentum: if momentum_present { base.momentum * scale } else { 0.0 },
        safety: if safety_present { base.safety * scale } else { 0.0 },
        value: if value_present { base.value * scale } else { 0.0 },
        fx_risk: if fx_present { base.fx_risk * scale } else { 0.0 },
        liquidity_risk: if liquidity_present { base.liquidity_risk * scale } else { 0.0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn us_eu_equity_carries_value_pillar() {
        let w = base_weights(MarketScope::UsEu, AssetType::Equity);
        assert_eq!(w.value, 0.30);
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn redistribution_sums_to_one_over_active_pillars() {
        let base = base_weights(MarketScope::UsEu, AssetType::Equity);
        let w = redistribute(base, true, true, false, false, false);
        assert!((w.momentum + w.safety - 1.0).abs() < 1e-9);
        assert_eq!(w.value, 0.0);
    }

    #[test]
    fn alternative_assets_use_momentum_safety_only() {
        let w = base_weights(MarketScope::Africa, AssetType::Crypto);
        assert_eq!(w.momentum, 0.60);
        assert_eq!(w.safety, 0.40);
        assert_eq!(w.value, 0.0);
    }
}
