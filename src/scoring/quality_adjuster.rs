use crate::domain::gating::GatingStatus;
use crate::domain::score::{AdjusterDebug, Score};
use crate::store::RelationalStore;

const DEFAULT_ALPHA: f64 = 1.6;
const DEFAULT_TARGET_ADV: f64 = 2_000_000.0;
const DEFAULT_PENALTY_MAX: f64 = 35.0;
const DEFAULT_CAP_ADV_FLOOR: f64 = 250_000.0;
const DEFAULT_CAP_ADV_SCORE: f64 = 60.0;
const DEFAULT_CAP_COVERAGE_FLOOR: f64 = 0.85;
const DEFAULT_CAP_COVERAGE_SCORE: f64 = 65.0;
const DEFAULT_CAP_STALE_CEIL: f64 = 0.10;
const DEFAULT_CAP_STALE_SCORE: f64 = 55.0;
const DEFAULT_CAP_ZERO_VOLUME_CEIL: f64 = 0.05;
const DEFAULT_CAP_ZERO_VOLUME_SCORE: f64 = 55.0;

/// Downgrades US_EU scores for illiquid or stale assets (spec §4.8).
/// AFRICA scores pass through unchanged; its liquidity/FX handling
/// lives in the pillar weights instead.
#[derive(Debug, Clone, Copy)]
pub struct QualityAdjuster {
    alpha: f64,
    target_adv: f64,
    penalty_max: f64,
    cap_adv_floor: f64,
    cap_adv_score: f64,
    cap_coverage_floor: f64,
    cap_coverage_score: f64,
    cap_stale_ceil: f64,
    cap_stale_score: f64,
    cap_zero_volume_ceil: f64,
    cap_zero_volume_score: f64,
}

impl Default for QualityAdjuster {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            target_adv: DEFAULT_TARGET_ADV,
            penalty_max: DEFAULT_PENALTY_MAX,
            cap_adv_floor: DEFAULT_CAP_ADV_FLOOR,
            cap_adv_score: DEFAULT_CAP_ADV_SCORE,
            cap_coverage_floor: DEFAULT_CAP_COVERAGE_FLOOR,
            cap_coverage_score: DEFAULT_CAP_COVERAGE_SCORE,
            cap_stale_ceil: DEFAULT_CAP_STALE_CEIL,
            cap_stale_score: DEFAULT_CAP_STALE_SCORE,
            cap_zero_volume_ceil: DEFAULT_CAP_ZERO_VOLUME_CEIL,
            cap_zero_volume_score: DEFAULT_CAP_ZERO_VOLUME_SCORE,
        }
    }
}

impl QualityAdjuster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads calibration overrides from `calibration_params`, falling
    /// back to the literal defaults above for any key not yet tuned
    /// (spec §9 Open Question 2).
    pub async fn from_store(store: &RelationalStore) -> crate::errors::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            alpha: store.get_calibration_param("adjuster_alpha", defaults.alpha).await?,
            target_adv: store.get_calibration_param("adjuster_target_adv", defaults.target_adv).await?,
            penalty_max: store.get_calibration_param("adjuster_penalty_max", defaults.penalty_max).await?,
            cap_adv_floor: store.get_calibration_param("adjuster_cap_adv_floor", defaults.cap_adv_floor).await?,
            cap_adv_score: store.get_calibration_param("adjuster_cap_adv_score", defaults.cap_adv_score).await?,
            cap_coverage_floor: store
                .get_calibration_param("adjuster_cap_coverage_floor", defaults.cap_coverage_floor)
                .await?,
            cap_coverage_score: store
                .get_calibration_param("adjuster_cap_coverage_score", defaults.cap_coverage_score)
                .await?,
            cap_stale_ceil: store.get_calibration_param("adjuster_cap_stale_ceil", defaults.cap_stale_ceil).await?,
            cap_stale_score: store.get_calibration_param("adjuster_cap_stale_score", defaults.cap_stale_score).await?,
            cap_zero_volume_ceil: store
                .get_calibration_param("adjuster_cap_zero_volume_ceil", defaults.cap_zero_volume_ceil)
                .await?,
            cap_zero_volume_score: store
                .get_calibration_param("adjuster_cap_zero_volume_score", defaults.cap_zero_volume_score)
                .await?,
        })
    }

    /// Applies the six-step transform in place when `score.score_total`
    /// is present; a `None` total (ineligible/too little history) is
    /// left untouched since there is nothing to downgrade.
    pub fn apply(&self, mut score: Score, gating: &GatingStatus) -> Score {
        let raw = match score.score_total {
            Some(v) => v,
            None => return score,
        };

        let confidence_multiplier = (gating.data_confidence / 100.0).powf(self.alpha);
        let score1 = raw * confidence_multiplier;

        let liquidity_penalty =
            ((self.target_adv - gating.liquidity) / self.target_adv).clamp(0.0, 1.0) * self.penalty_max;
        let score2 = score1 - liquidity_penalty;

        let mut caps_applied = Vec::new();
        let mut cap = f64::INFINITY;
        if gating.liquidity < self.cap_adv_floor {
            cap = cap.min(self.cap_adv_score);
            caps_applied.push("adv_floor".to_string());
        }
        if gating.coverage < self.cap_coverage_floor {
            cap = cap.min(self.cap_coverage_score);
            caps_applied.push("coverage_floor".to_string());
        }
        if gating.stale_ratio > self.cap_stale_ceil {
            cap = cap.min(self.cap_stale_score);
            caps_applied.push("stale_ratio".to_string());
        }
        if gating.zero_volume_ratio > self.cap_zero_volume_ceil {
            cap = cap.min(self.cap_zero_volume_score);
            caps_applied.push("zero_volume_ratio".to_string());
        }

        let capped = if cap.is_finite() { score2.min(cap) } else { score2 };
        let final_score = capped.clamp(0.0, 100.0);

        score.breakdown.adjuster = Some(AdjusterDebug {
            raw_score: raw,
            confidence_multiplier,
            liquidity_penalty,
            caps_applied,
            final_score,
        });
        score.score_total = Some(final_score);
        score.confidence = score.confidence.min(gating.data_confidence.round() as i32);

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::score::{PillarWeights, ScoreBreakdown, StateLabel, ENGINE_VERSION};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn base_score(total: f64) -> Score {
        Score {
            asset_id: "AAPL.US".to_string(),
            market_scope: "US_EU".to_string(),
            score_total: Some(total),
            score_value: None,
            score_momentum: None,
            score_safety: None,
            score_fx_risk: None,
            score_liquidity_risk: None,
            confidence: 90,
            state_label: StateLabel::Equilibre,
            rsi: None,
            zscore: None,
            vol_annual: None,
            max_drawdown: None,
            sma200: None,
            last_price: Some(100.0),
            fundamentals_available: false,
            breakdown: ScoreBreakdown {
                engine_version: ENGINE_VERSION,
                computed_at: Utc::now(),
                weights: PillarWeights { momentum: 1.0, safety: 0.0, value: 0.0, fx_risk: 0.0, liquidity_risk: 0.0 },
                raw_features: BTreeMap::new(),
                pillar_momentum: None,
                pillar_safety: None,
                pillar_value: None,
                pillar_fx_risk: None,
                pillar_liquidity_risk: None,
                confidence_components: BTreeMap::new(),
                adjuster: None,
                extras: BTreeMap::new(),
            },
            computed_at: Utc::now(),
        }
    }

    fn healthy_gating() -> GatingStatus {
        let mut g = GatingStatus::no_data("AAPL.US", "US_EU");
        g.eligible = true;
        g.coverage = 0.95;
        g.liquidity = 5_000_000.0;
        g.stale_ratio = 0.02;
        g.zero_volume_ratio = 0.0;
        g.data_confidence = 92.0;
        g
    }

    #[test]
    fn healthy_asset_is_barely_adjusted() {
        let adjuster = QualityAdjuster::new();
        let adjusted = adjuster.apply(base_score(80.0), &healthy_gating());
        let total = adjusted.score_total.unwrap();
        assert!(total > 70.0 && total <= 80.0);
        assert!(adjusted.breakdown.adjuster.unwrap().caps_applied.is_empty());
    }

    #[test]
    fn illiquid_asset_hits_adv_cap() {
        let adjuster = QualityAdjuster::new();
        let mut gating = healthy_gating();
        gating.liquidity = 100_000.0;
        let adjusted = adjuster.apply(base_score(95.0), &gating);
        assert!(adjusted.score_total.unwrap() <= 60.0);
        assert!(adjusted.breakdown.adjuster.unwrap().caps_applied.contains(&"adv_floor".to_string()));
    }

    #[test]
    fn stale_data_caps_at_55() {
        let adjuster = QualityAdjuster::new();
        let mut gating = healthy_gating();
        gating.stale_ratio = 0.30;
        let adjusted = adjuster.apply(base_score(95.0), &gating);
        assert!(adjusted.score_total.unwrap() <= 55.0);
    }

    #[test]
    fn none_total_is_left_untouched() {
        let adjuster = QualityAdjuster::new();
        let mut score = base_score(0.0);
        score.score_total = None;
        let adjusted = adjuster.apply(score, &healthy_gating());
        assert!(adjusted.score_total.is_none());
        assert!(adjusted.breakdown.adjuster.is_none());
    }

    #[test]
    fn confidence_is_capped_by_data_confidence() {
        let adjuster = QualityAdjuster::new();
        let mut gating = healthy_gating();
        gating.data_confidence = 40.0;
        let mut score = base_score(80.0);
        score.confidence = 90;
        let adjusted = adjuster.apply(score, &gating);
        assert_eq!(adjusted.confidence, 40);
    }
}
