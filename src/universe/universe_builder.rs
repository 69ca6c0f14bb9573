use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::asset::{Asset, AssetType, Tier};
use crate::domain::scope::MarketScope;
use crate::errors::Result;
use crate::external::price_provider::PriceProvider;
use crate::external::symbol;
use crate::store::RelationalStore;

/// Exchanges this deployment covers per scope (spec §4.4 step 1).
/// Kept alongside `symbol::KNOWN_EXCHANGES`/`scope_for_exchange`
/// rather than duplicated there, since this is the authoritative
/// "which exchanges do we actually ingest" list, narrower than "which
/// suffixes do we recognize on input".
fn exchanges_for_scope(scope: MarketScope) -> &'static [&'static str] {
    match scope {
        MarketScope::UsEu => &["US", "LSE", "PA", "XETRA", "AS", "MI", "SW"],
        MarketScope::Africa => &["JSE", "NG", "EGX", "NSE", "CAI"],
    }
}

fn tier_thresholds(scope: MarketScope) -> [(Tier, f64); 3] {
    match scope {
        MarketScope::UsEu => [(Tier::One, 5_000_000.0), (Tier::Two, 1_000_000.0), (Tier::Three, 100_000.0)],
        MarketScope::Africa => [(Tier::One, 500_000.0), (Tier::Two, 100_000.0), (Tier::Three, 10_000.0)],
    }
}

fn activation_limits(scope: MarketScope) -> (usize, usize) {
    match scope {
        MarketScope::UsEu => (2000, 1000),
        MarketScope::Africa => (500, 500),
    }
}

fn assign_tier(adv_usd: f64, scope: MarketScope) -> Tier {
    for (tier, floor) in tier_thresholds(scope) {
        if adv_usd >= floor {
            return tier;
        }
    }
    Tier::Four
}

pub struct UniverseBuilder {
    store: RelationalStore,
    provider: Arc<dyn PriceProvider>,
}

#[derive(Debug, Default)]
pub struct UniverseBuildReport {
    pub exchanges_scanned: usize,
    pub assets_upserted: usize,
    pub tier1_active: usize,
    pub tier2_active: usize,
}

impl UniverseBuilder {
    pub fn new(store: RelationalStore, provider: Arc<dyn PriceProvider>) -> Self {
        Self { store, provider }
    }

    /// Runs the full list-symbols + bulk-EOD + tiering + activation
    /// algorithm for one scope (spec §4.4 steps 1-6).
    pub async fn rebuild(&self, scope: MarketScope) -> Result<UniverseBuildReport> {
        let mut report = UniverseBuildReport::default();
        let mut assets: Vec<Asset> = Vec::new();
        let mut adv_by_asset: HashMap<String, f64> = HashMap::new();

        for &exchange in exchanges_for_scope(scope) {
            report.exchanges_scanned += 1;

            let listings = match self.provider.list_symbols(exchange).await {
                Ok(listings) => listings,
                Err(e) => {
                    warn!(exchange, error = %e, "list-symbols failed, skipping exchange");
                    continue;
                }
            };

            let bulk_rows = match self.provider.bulk_eod(exchange).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(exchange, error = %e, "bulk-eod failed, skipping exchange");
                    continue;
                }
            };
            let adv: HashMap<String, f64> =
                bulk_rows.into_iter().map(|r| (r.symbol.clone(), r.close * r.volume)).collect();

            for listing in listings {
                let asset_id = symbol::normalize(&listing.symbol, exchange);
                let asset_type = listing
                    .asset_type
                    .parse::<AssetType>()
                    .unwrap_or_else(|_| symbol::classify_asset_type(&asset_id));

                let mut asset = Asset::new(
                    asset_id.clone(),
                    listing.symbol.clone(),
                    listing.name,
                    asset_type,
                    scope,
                    exchange,
                    listing.currency,
                );
                asset.country = listing.country;

                if let Some(&adv_usd) = adv.get(&listing.symbol) {
                    adv_by_asset.insert(asset_id.clone(), adv_usd);
                    asset.tier = assign_tier(adv_usd, scope).as_i32();
                } else {
                    asset.tier = Tier::Four.as_i32();
                }

                assets.push(asset);
            }
        }

        let (tier1_limit, tier2_limit) = activation_limits(scope);
        activate_by_tier(&mut assets, &adv_by_asset, tier1_limit, tier2_limit, &mut report);

        report.assets_upserted = assets.len();
        self.store.bulk_upsert_assets(&assets, scope).await?;

        info!(
            scope = %scope,
            exchanges = report.exchanges_scanned,
            assets = report.assets_upserted,
            tier1_active = report.tier1_active,
            tier2_active = report.tier2_active,
            "universe rebuild complete"
        );

        Ok(report)
    }

    /// Bootstraps a universe from a CSV of symbols instead of the
    /// provider's list-symbols/bulk-EOD calls, for offline seeding or
    /// exchanges the provider doesn't cover (spec §6 `universe
    /// --from-csv PATH`). Expected columns: `symbol,name,asset_type,
    /// exchange,currency,adv_usd`; `adv_usd` drives tiering exactly as
    /// step 3-5 of the provider path.
    pub async fn rebuild_from_csv(&self, scope: MarketScope, path: &std::path::Path) -> Result<UniverseBuildReport> {
        #[derive(Debug, serde::Deserialize)]
        struct CsvRow {
            symbol: String,
            name: String,
            asset_type: String,
            exchange: String,
            currency: String,
            adv_usd: f64,
        }

        let mut report = UniverseBuildReport::default();
        let mut assets: Vec<Asset> = Vec::new();
        let mut adv_by_asset: HashMap<String, f64> = HashMap::new();

        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        for result in reader.deserialize() {
            let row: CsvRow = result?;
            let asset_id = symbol::normalize(&row.symbol, &row.exchange);
            let asset_type = row.asset_type.parse::<AssetType>().unwrap_or_else(|_| symbol::classify_asset_type(&asset_id));

            let mut asset = Asset::new(asset_id.clone(), row.symbol, row.name, asset_type, scope, row.exchange, row.currency);
            asset.tier = assign_tier(row.adv_usd, scope).as_i32();
            adv_by_asset.insert(asset_id, row.adv_usd);
            assets.push(asset);
        }
        report.exchanges_scanned = 0;

        let (tier1_limit, tier2_limit) = activation_limits(scope);
        activate_by_tier(&mut assets, &adv_by_asset, tier1_limit, tier2_limit, &mut report);

        report.assets_upserted = assets.len();
        self.store.bulk_upsert_assets(&assets, scope).await?;

        info!(scope = %scope, path = %path.display(), assets = report.assets_upserted, "universe rebuild from csv complete");

        Ok(report)
    }
}

/// Sorts each tier by ADV descending, activates at most `tier1_limit`
/// + `tier2_limit` assets; tier 3/4 remain inactive (spec §4.4 step 5).
fn activate_by_tier(
    assets: &mut [Asset],
    adv_by_asset: &HashMap<String, f64>,
    tier1_limit: usize,
    tier2_limit: usize,
    report: &mut UniverseBuildReport,
) {
    for asset in assets.iter_mut() {
        asset.active = false;
    }

    let mut tier1_idx: Vec<usize> = Vec::new();
    let mut tier2_idx: Vec<usize> = Vec::new();
    for (i, asset) in assets.iter().enumerate() {
        match asset.tier() {
            Tier::One => tier1_idx.push(i),
            Tier::Two => tier2_idx.push(i),
            _ => {}
        }
    }

    let adv_of = |idx: &usize, assets: &[Asset]| -> f64 {
        adv_by_asset.get(&assets[*idx].asset_id).copied().unwrap_or(0.0)
    };
    tier1_idx.sort_by(|a, b| adv_of(b, assets).partial_cmp(&adv_of(a, assets)).unwrap());
    tier2_idx.sort_by(|a, b| adv_of(b, assets).partial_cmp(&adv_of(a, assets)).unwrap());

    for &i in tier1_idx.iter().take(tier1_limit) {
        assets[i].active = true;
        report.tier1_active += 1;
    }
    for &i in tier2_idx.iter().take(tier2_limit) {
        assets[i].active = true;
        report.tier2_active += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_us_eu_tiers_by_threshold() {
        assert_eq!(assign_tier(6_000_000.0, MarketScope::UsEu), Tier::One);
        assert_eq!(assign_tier(2_000_000.0, MarketScope::UsEu), Tier::Two);
        assert_eq!(assign_tier(150_000.0, MarketScope::UsEu), Tier::Three);
        assert_eq!(assign_tier(1_000.0, MarketScope::UsEu), Tier::Four);
    }

    #[test]
    fn assigns_africa_tiers_by_lower_thresholds() {
        assert_eq!(assign_tier(600_000.0, MarketScope::Africa), Tier::One);
        assert_eq!(assign_tier(50_000.0, MarketScope::Africa), Tier::Two);
    }

    #[test]
    fn activation_caps_tier1_and_tier2_counts() {
        let mut assets: Vec<Asset> = (0..5)
            .map(|i| {
                let mut a = Asset::new(format!("A{i}.US"), format!("A{i}"), "name", AssetType::Equity, MarketScope::UsEu, "US", "USD");
                a.tier = Tier::One.as_i32();
                a
            })
            .collect();
        let adv: HashMap<String, f64> = assets.iter().map(|a| (a.asset_id.clone(), 10_000_000.0)).collect();
        let mut report = UniverseBuildReport::default();
        activate_by_tier(&mut assets, &adv, 3, 1000, &mut report);
        assert_eq!(report.tier1_active, 3);
        assert_eq!(assets.iter().filter(|a| a.active).count(), 3);
    }
}
