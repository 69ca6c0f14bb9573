use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-asset rotation bookkeeping, independent of `market_scope`
/// (an `asset_id` belongs to exactly one scope) (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RotationState {
    pub asset_id: String,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub priority_level: i32,
    pub in_top50: bool,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub refresh_count: i64,
}

impl RotationState {
    pub fn new(asset_id: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            last_refresh_at: None,
            priority_level: 0,
            in_top50: false,
            cooldown_until: None,
            last_error: None,
            refresh_count: 0,
        }
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map(|until| now < until).unwrap_or(false)
    }
}
