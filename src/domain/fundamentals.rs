use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fundamentals used by the Value pillar. Only fetched for EQUITY/FUND
/// assets (spec §4.11 step 5); the spec leaves the exact shape
/// unspecified beyond "optional Fundamentals" so this is the minimal
/// set the Value pillar (spec §4.6) actually consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fundamentals {
    pub pe_ratio: Option<f64>,
    pub profit_margin_pct: Option<f64>,
    pub roe_pct: Option<f64>,
    pub market_cap: Option<f64>,
    pub sector: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Fundamentals {
    pub fn empty() -> Self {
        Self {
            pe_ratio: None,
            profit_margin_pct: None,
            roe_pct: None,
            market_cap: None,
            sector: None,
            updated_at: Utc::now(),
        }
    }
}
