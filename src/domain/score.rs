use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed set of raw/normalized feature names carried in a breakdown.
/// Replaces the free-form feature dict the original system used
/// (spec §9 "Dynamic typing of feature dicts").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureName {
    Rsi14,
    Sma50,
    Sma200,
    PriceVsSma200Pct,
    ZScore20,
    VolAnnualPct,
    MaxDrawdownPct,
    Pe,
    ProfitMarginPct,
    RoePct,
    FxRiskRaw,
    LiquidityTier,
    AdvUsd,
}

pub type FeatureMap = BTreeMap<FeatureName, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateLabel {
    Equilibre,
    ExtensionHaute,
    ExtensionBasse,
    StressHaussier,
    StressBaissier,
    Na,
}

impl StateLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateLabel::Equilibre => "EQUILIBRE",
            StateLabel::ExtensionHaute => "EXTENSION_HAUTE",
            StateLabel::ExtensionBasse => "EXTENSION_BASSE",
            StateLabel::StressHaussier => "STRESS_HAUSSIER",
            StateLabel::StressBaissier => "STRESS_BAISSIER",
            StateLabel::Na => "NA",
        }
    }
}

/// One active pillar's resolved weight, after redistribution across
/// whichever pillars actually have a value (spec §4.6 "Weighting").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PillarWeights {
    pub momentum: f64,
    pub safety: f64,
    pub value: f64,
    pub fx_risk: f64,
    pub liquidity_risk: f64,
}

impl PillarWeights {
    pub fn sum(&self) -> f64 {
        self.momentum + self.safety + self.value + self.fx_risk + self.liquidity_risk
    }
}

/// Audit trail attached to every non-null score: engine version,
/// timestamp, exact weights used, raw features, normalized pillar
/// values, confidence components, and (US_EU) adjuster debug info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub engine_version: &'static str,
    pub computed_at: DateTime<Utc>,
    pub weights: PillarWeights,
    pub raw_features: FeatureMap,
    pub pillar_momentum: Option<f64>,
    pub pillar_safety: Option<f64>,
    pub pillar_value: Option<f64>,
    pub pillar_fx_risk: Option<f64>,
    pub pillar_liquidity_risk: Option<f64>,
    pub confidence_components: BTreeMap<String, f64>,
    pub adjuster: Option<AdjusterDebug>,
    pub extras: BTreeMap<String, f64>,
}

/// QualityAdjuster audit trail (spec §4.8 step 5), merged in after the
/// adjuster runs. `None` for AFRICA scores, which are returned
/// unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjusterDebug {
    pub raw_score: f64,
    pub confidence_multiplier: f64,
    pub liquidity_penalty: f64,
    pub caps_applied: Vec<String>,
    pub final_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub asset_id: String,
    pub market_scope: String,
    pub score_total: Option<f64>,
    pub score_value: Option<f64>,
    pub score_momentum: Option<f64>,
    pub score_safety: Option<f64>,
    pub score_fx_risk: Option<f64>,
    pub score_liquidity_risk: Option<f64>,
    pub confidence: i32,
    pub state_label: StateLabel,
    pub rsi: Option<f64>,
    pub zscore: Option<f64>,
    pub vol_annual: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub sma200: Option<f64>,
    pub last_price: Option<f64>,
    pub fundamentals_available: bool,
    pub breakdown: ScoreBreakdown,
    pub computed_at: DateTime<Utc>,
}

pub const ENGINE_VERSION: &str = "scoring-engine/1";
