//! Environment-driven configuration, following the teacher's
//! `LoggingConfig::from_env` pattern: one struct, defaults for
//! everything, a `validate()` pass before use.

use crate::domain::scope::MarketScope;

#[derive(Debug, Clone)]
pub struct Config {
    pub eodhd_api_key: Option<String>,
    pub eodhd_base_url: String,
    pub default_exchange: String,
    pub data_dir: String,
    pub sqlite_path: String,
    pub rotation_batch_size: usize,
    pub rotation_period_minutes: u64,
    pub schedule_rotation_minutes: u64,
    pub schedule_gating_hours: u64,
    pub schedule_pool_hours: u64,
    pub schedule_universe_days: u64,
    pub billing_mode: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            eodhd_api_key: std::env::var("EODHD_API_KEY").ok(),
            eodhd_base_url: std::env::var("EODHD_BASE_URL")
                .unwrap_or_else(|_| "https://eodhd.com/api".to_string()),
            default_exchange: std::env::var("DEFAULT_EXCHANGE").unwrap_or_else(|_| "US".to_string()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            sqlite_path: std::env::var("SQLITE_PATH")
                .unwrap_or_else(|_| "./data/sqlite/marketgps.db".to_string()),
            rotation_batch_size: std::env::var("ROTATION_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            rotation_period_minutes: std::env::var("ROTATION_PERIOD_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            schedule_rotation_minutes: std::env::var("SCHEDULE_ROTATION_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            schedule_gating_hours: std::env::var("SCHEDULE_GATING_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(6),
            schedule_pool_hours: std::env::var("SCHEDULE_POOL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            schedule_universe_days: std::env::var("SCHEDULE_UNIVERSE_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
            billing_mode: std::env::var("BILLING_MODE").unwrap_or_else(|_| "standard".to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.rotation_batch_size == 0 {
            return Err("ROTATION_BATCH_SIZE must be > 0".to_string());
        }
        Ok(())
    }

    pub fn bar_dir(&self, scope: MarketScope) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir)
            .join("parquet")
            .join(scope.dir_name())
            .join("bars_daily")
    }
}
