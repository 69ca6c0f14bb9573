use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-asset, per-scope data-quality snapshot (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GatingStatus {
    pub asset_id: String,
    pub market_scope: String,
    pub coverage: f64,
    pub liquidity: f64,
    pub price_min: f64,
    pub stale_ratio: f64,
    pub zero_volume_ratio: f64,
    pub eligible: bool,
    pub reason: Option<String>,
    pub data_confidence: f64,
    pub fx_risk: Option<f64>,
    pub liquidity_risk: Option<f64>,
    pub last_bar_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl GatingStatus {
    pub fn no_data(asset_id: impl Into<String>, market_scope: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            market_scope: market_scope.into(),
            coverage: 0.0,
            liquidity: 0.0,
            price_min: 0.0,
            stale_ratio: 1.0,
            zero_volume_ratio: 1.0,
            eligible: false,
            reason: Some("NO_DATA".to_string()),
            data_confidence: 5.0,
            fx_risk: None,
            liquidity_risk: None,
            last_bar_date: None,
            updated_at: Utc::now(),
        }
    }
}
