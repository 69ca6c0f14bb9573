pub mod price_provider;
pub mod primary_provider;
pub mod fallback_provider;
pub mod multi_provider;
pub mod rate_limiter;
pub mod failure_cache;
pub mod symbol;

pub use multi_provider::{MultiProvider, ProviderSelection};
pub use price_provider::{
    BulkEodRow, ExchangeListing, Health, HealthState, PriceProvider, ProviderError,
};
