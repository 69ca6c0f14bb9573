use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FailureInfo {
    pub failed_at: DateTime<Utc>,
    pub error_type: FailureType,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureType {
    NotFound,
    RateLimited,
    ApiError,
}

/// Thread-safe cache of recently-failed asset lookups, so a rotation
/// run doesn't keep paying for calls it already knows will fail.
#[derive(Clone)]
pub struct FailureCache {
    cache: Arc<DashMap<String, FailureInfo>>,
}

impl FailureCache {
    pub fn new() -> Self {
        Self { cache: Arc::new(DashMap::new()) }
    }

    pub fn is_failed(&self, asset_id: &str) -> Option<FailureInfo> {
        if let Some(entry) = self.cache.get(asset_id) {
            let info = entry.value().clone();
            let expiry = info.failed_at + Duration::hours(info.ttl_hours);
            if Utc::now() < expiry {
                return Some(info);
            }
            drop(entry);
            self.cache.remove(asset_id);
        }
        None
    }

    pub fn record_failure(&self, asset_id: &str, error_type: FailureType) {
        let ttl_hours = match error_type {
            FailureType::NotFound => 24,
            FailureType::RateLimited => 1,
            FailureType::ApiError => 6,
        };
        self.cache.insert(
            asset_id.to_string(),
            FailureInfo { failed_at: Utc::now(), error_type, ttl_hours },
        );
    }

    pub fn clear(&self, asset_id: &str) {
        self.cache.remove(asset_id);
    }

    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        self.cache.retain(|_, info| now < info.failed_at + Duration::hours(info.ttl_hours));
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for FailureCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_retrieves_failures() {
        let cache = FailureCache::new();
        cache.record_failure("BAD.US", FailureType::NotFound);
        assert_eq!(cache.is_failed("BAD.US").unwrap().error_type, FailureType::NotFound);
    }

    #[test]
    fn clears_entries() {
        let cache = FailureCache::new();
        cache.record_failure("TEST.US", FailureType::NotFound);
        cache.clear("TEST.US");
        assert!(cache.is_failed("TEST.US").is_none());
    }

    #[test]
    fn different_ttls_per_error_type() {
        let cache = FailureCache::new();
        cache.record_failure("A.US", FailureType::NotFound);
        cache.record_failure("B.US", FailureType::RateLimited);
        assert_eq!(cache.is_failed("A.US").unwrap().ttl_hours, 24);
        assert_eq!(cache.is_failed("B.US").unwrap().ttl_hours, 1);
    }
}
