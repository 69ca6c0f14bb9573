use std::collections::HashSet;

use crate::domain::job::JobMode;
use crate::domain::scope::MarketScope;
use crate::errors::Result;
use crate::store::RelationalStore;

/// Default number of asset slots a single run fills (spec §4.7 step 3
/// "batches of `batch_size`, default 50").
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Builds the update set for one run without scanning the universe
/// (spec §4.9). Priority order, deduplicated, truncated to the batch
/// cap:
///
/// 1. Current published top-50 for this scope.
/// 2. All Tier-1 active assets for this scope.
/// 3. Priority/watchlist assets with a non-expired boost.
/// 4. Oldest Tier-2 assets (by `last_refresh_at`, NULLs first) to fill
///    remaining slots — `daily_full` only.
///
/// `hourly_overlay` stops after step 3 (top-50 ∪ Tier-1 ∪ priority);
/// `on_demand` bypasses all of this and uses the caller's `asset_ids`
/// directly.
pub struct RotationSelector;

impl RotationSelector {
    pub async fn select(
        store: &RelationalStore,
        scope: MarketScope,
        mode: JobMode,
        batch_size: usize,
        asset_ids: Option<Vec<String>>,
    ) -> Result<Vec<String>> {
        if mode == JobMode::OnDemand {
            return Ok(asset_ids.unwrap_or_default());
        }

        let mut seen = HashSet::new();
        let mut selected = Vec::new();

        for id in store.get_top50_asset_ids(scope).await? {
            if seen.insert(id.clone()) {
                selected.push(id);
            }
        }

        for asset in store.get_tier1_assets(scope).await? {
            if seen.insert(asset.asset_id.clone()) {
                selected.push(asset.asset_id);
            }
        }

        let priority_limit = batch_size.max(1) as i64;
        for asset in store.get_priority_assets(priority_limit, scope).await? {
            if seen.insert(asset.asset_id.clone()) {
                selected.push(asset.asset_id);
            }
        }

        if mode == JobMode::DailyFull && selected.len() < batch_size {
            let remaining = (batch_size - selected.len()) as i64;
            for asset in store.get_tier2_assets_by_staleness(scope, remaining).await? {
                if seen.insert(asset.asset_id.clone()) {
                    selected.push(asset.asset_id);
                }
            }
        }

        selected.truncate(batch_size);
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::{Asset, AssetType};

    async fn memory_store() -> RelationalStore {
        RelationalStore::connect(":memory:").await.unwrap()
    }

    fn tier(asset_id: &str, tier: i32, priority: i32) -> Asset {
        let mut a = Asset::new(asset_id, asset_id, asset_id, AssetType::Equity, MarketScope::UsEu, "US", "USD");
        a.tier = tier;
        a.priority_level = priority;
        a.active = true;
        a
    }

    #[tokio::test]
    async fn on_demand_mode_returns_supplied_ids_verbatim() {
        let store = memory_store().await;
        let ids = vec!["AAPL.US".to_string(), "MSFT.US".to_string()];
        let selected = RotationSelector::select(&store, MarketScope::UsEu, JobMode::OnDemand, 50, Some(ids.clone()))
            .await
            .unwrap();
        assert_eq!(selected, ids);
    }

    #[tokio::test]
    async fn hourly_overlay_never_pulls_tier2() {
        let store = memory_store().await;
        let mut assets: Vec<Asset> = (0..5).map(|i| tier(&format!("T1-{i}.US"), 1, 0)).collect();
        assets.extend((0..5).map(|i| tier(&format!("T2-{i}.US"), 2, 0)));
        store.bulk_upsert_assets(&assets, MarketScope::UsEu).await.unwrap();

        let selected = RotationSelector::select(&store, MarketScope::UsEu, JobMode::HourlyOverlay, 50, None)
            .await
            .unwrap();
        assert!(selected.iter().all(|id| id.starts_with("T1-")));
    }

    #[tokio::test]
    async fn daily_full_backfills_with_tier2_when_under_batch() {
        let store = memory_store().await;
        let mut assets: Vec<Asset> = (0..3).map(|i| tier(&format!("T1-{i}.US"), 1, 0)).collect();
        assets.extend((0..10).map(|i| tier(&format!("T2-{i}.US"), 2, 0)));
        store.bulk_upsert_assets(&assets, MarketScope::UsEu).await.unwrap();

        let selected = RotationSelector::select(&store, MarketScope::UsEu, JobMode::DailyFull, 8, None)
            .await
            .unwrap();
        assert_eq!(selected.len(), 8);
        assert!(selected.iter().any(|id| id.starts_with("T2-")));
    }
}
