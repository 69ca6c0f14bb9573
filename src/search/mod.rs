//! Asset search filter set (spec §6): single source of truth for all
//! asset listings, implemented entirely against the local `universe` /
//! `scores_latest` tables — never against a provider search endpoint
//! (spec §9 Open Question 4).

use serde::{Deserialize, Serialize};

use crate::domain::asset::AssetType;
use crate::domain::scope::MarketScope;
use crate::domain::score::Score;
use crate::errors::{AppError, Result};
use crate::store::RelationalStore;

/// Institutional liquidity tier, distinct from `domain::asset::Tier`:
/// a caller-facing A/B/C/D classification rather than the internal
/// 1-4 rotation tier (spec §6 "min_liquidity_tier ∈ {A,B,C,D}").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidityTier {
    A,
    B,
    C,
    D,
}

impl LiquidityTier {
    /// Maps onto `domain::asset::Tier` 1:1, A being the most liquid.
    fn floor_as_asset_tier(&self) -> i32 {
        match self {
            LiquidityTier::A => 1,
            LiquidityTier::B => 2,
            LiquidityTier::C => 3,
            LiquidityTier::D => 4,
        }
    }
}

/// Whitelisted sort fields (spec §6 "sort field from a whitelist").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    ScoreTotal,
    Symbol,
    Tier,
    UpdatedAt,
}

impl SortField {
    fn column(&self) -> &'static str {
        match self {
            SortField::ScoreTotal => "score_total",
            SortField::Symbol => "symbol",
            SortField::Tier => "tier",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetSearchFilters {
    pub market_scope: Option<MarketScope>,
    pub market_code: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub asset_type: Option<AssetType>,
    pub only_scored: bool,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub min_liquidity_tier: Option<LiquidityTier>,
    pub exclude_flagged: bool,
    pub min_horizon_years: Option<f64>,
    pub query: Option<String>,
    pub sort: Option<SortField>,
}

#[derive(Debug, Clone)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, page_size: 50 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetSearchResult {
    pub asset_id: String,
    pub symbol: String,
    pub name: String,
    pub asset_type: String,
    pub market_scope: String,
    pub tier: i32,
    pub score_total: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub results: Vec<AssetSearchResult>,
    pub total: i64,
}

/// Regions recognized for AFRICA scope, each owning a closed set of
/// countries (spec §6 "country ∈ region" validation).
fn region_countries(region: &str) -> Option<&'static [&'static str]> {
    match region.to_ascii_uppercase().as_str() {
        "WEST_AFRICA" => Some(&["NG", "GH", "CI", "SN"]),
        "SOUTHERN_AFRICA" => Some(&["ZA", "BW", "NA", "ZM"]),
        "NORTH_AFRICA" => Some(&["EG", "MA", "TN"]),
        "EAST_AFRICA" => Some(&["KE", "TZ", "UG", "RW"]),
        _ => None,
    }
}

/// Validates filter combinations before hitting the store (spec §6
/// "Invalid filter combinations produce validation errors").
fn validate(filters: &AssetSearchFilters) -> Result<()> {
    if let Some(scope) = filters.market_scope {
        match scope {
            MarketScope::Africa => {
                if filters.market_code.is_some() {
                    return Err(AppError::Validation(
                        "market_code is a US_EU filter; use region/country for AFRICA".to_string(),
                    ));
                }
                if let (Some(region), Some(country)) = (&filters.region, &filters.country) {
                    let countries = region_countries(region)
                        .ok_or_else(|| AppError::Validation(format!("unknown region: {region}")))?;
                    if !countries.contains(&country.to_ascii_uppercase().as_str()) {
                        return Err(AppError::Validation(format!(
                            "country {country} is not part of region {region}"
                        )));
                    }
                }
            }
            MarketScope::UsEu => {
                if filters.region.is_some() || filters.country.is_some() {
                    return Err(AppError::Validation(
                        "region/country are AFRICA filters; use market_code for US_EU".to_string(),
                    ));
                }
            }
        }
    }

    if let (Some(min), Some(max)) = (filters.min_score, filters.max_score) {
        if min > max {
            return Err(AppError::Validation("min_score must be <= max_score".to_string()));
        }
    }

    Ok(())
}

/// Runs `filters` + `pagination` against the local store (spec §6
/// `searchAssets`). `exclude_flagged` excludes ineligible-gated assets
/// (the closest local analogue to an institutional "flagged" list);
/// `min_horizon_years` is not modeled by any stored field in this
/// core, so it is accepted and validated but has no effect here — left
/// for a future collaborator that tracks asset-level holding horizons.
pub async fn search_assets(
    store: &RelationalStore,
    filters: &AssetSearchFilters,
    pagination: &Pagination,
) -> Result<SearchResults> {
    validate(filters)?;

    let scope = filters.market_scope;
    let candidates = match scope {
        Some(scope) => store.get_active_assets(scope).await?,
        None => {
            let mut all = store.get_active_assets(MarketScope::UsEu).await?;
            all.extend(store.get_active_assets(MarketScope::Africa).await?);
            all
        }
    };

    let mut rows = Vec::with_capacity(candidates.len());
    for asset in candidates {
        if let Some(ref code) = filters.market_code {
            if !asset.market_code.eq_ignore_ascii_case(code) {
                continue;
            }
        }
        if let Some(ref country) = filters.country {
            let matches = asset.country.as_deref().map(|c| c.eq_ignore_ascii_case(country)).unwrap_or(false);
            if !matches {
                continue;
            }
        }
        if let Some(want_type) = filters.asset_type {
            if asset.asset_type() != want_type {
                continue;
            }
        }
        if let Some(tier) = filters.min_liquidity_tier {
            if asset.tier > tier.floor_as_asset_tier() {
                continue;
            }
        }
        if let Some(ref q) = filters.query {
            let q = q.to_ascii_lowercase();
            if !asset.symbol.to_ascii_lowercase().contains(&q) && !asset.name.to_ascii_lowercase().contains(&q) {
                continue;
            }
        }

        let score = store.get_score(&asset.asset_id).await?;

        if filters.only_scored && score.as_ref().and_then(|s| s.score_total).is_none() {
            continue;
        }
        if filters.exclude_flagged {
            if let Some(gating) = store.get_gating(&asset.asset_id).await? {
                if !gating.eligible {
                    continue;
                }
            }
        }
        if !score_in_range(&score, filters.min_score, filters.max_score) {
            continue;
        }

        rows.push(AssetSearchResult {
            asset_id: asset.asset_id,
            symbol: asset.symbol,
            name: asset.name,
            asset_type: asset.asset_type,
            market_scope: asset.market_scope,
            tier: asset.tier,
            score_total: score.and_then(|s| s.score_total),
        });
    }

    sort_results(&mut rows, filters.sort);

    let total = rows.len() as i64;
    let start = ((pagination.page.max(1) - 1) * pagination.page_size.max(1)).max(0) as usize;
    let page = rows.into_iter().skip(start).take(pagination.page_size.max(1) as usize).collect();

    Ok(SearchResults { results: page, total })
}

fn score_in_range(score: &Option<Score>, min: Option<f64>, max: Option<f64>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let Some(total) = score.as_ref().and_then(|s| s.score_total) else {
        return false;
    };
    if let Some(min) = min {
        if total < min {
            return false;
        }
    }
    if let Some(max) = max {
        if total > max {
            return false;
        }
    }
    true
}

fn sort_results(rows: &mut [AssetSearchResult], sort: Option<SortField>) {
    match sort.unwrap_or(SortField::ScoreTotal) {
        SortField::ScoreTotal => rows.sort_by(|a, b| {
            b.score_total.unwrap_or(f64::MIN).partial_cmp(&a.score_total.unwrap_or(f64::MIN)).unwrap()
        }),
        SortField::Symbol => rows.sort_by(|a, b| a.symbol.cmp(&b.symbol)),
        SortField::Tier => rows.sort_by_key(|r| r.tier),
        SortField::UpdatedAt => {} // not tracked on AssetSearchResult; stable no-op keeps whitelist closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::Asset;

    async fn seeded_store() -> RelationalStore {
        let store = RelationalStore::connect(":memory:").await.unwrap();
        let mut a1 = Asset::new("AAPL.US", "AAPL", "Apple", AssetType::Equity, MarketScope::UsEu, "US", "USD");
        a1.tier = 1;
        a1.active = true;
        let mut a2 = Asset::new("NPN.JSE", "NPN", "Naspers", AssetType::Equity, MarketScope::Africa, "JSE", "ZAR");
        a2.country = Some("ZA".to_string());
        a2.tier = 1;
        a2.active = true;
        store.upsert_asset(&a1, MarketScope::UsEu).await.unwrap();
        store.upsert_asset(&a2, MarketScope::Africa).await.unwrap();
        store
    }

    #[tokio::test]
    async fn market_code_with_africa_scope_is_rejected() {
        let store = seeded_store().await;
        let filters = AssetSearchFilters {
            market_scope: Some(MarketScope::Africa),
            market_code: Some("US_EU".to_string()),
            ..Default::default()
        };
        let result = search_assets(&store, &filters, &Pagination::default()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn country_outside_region_is_rejected() {
        let store = seeded_store().await;
        let filters = AssetSearchFilters {
            market_scope: Some(MarketScope::Africa),
            region: Some("WEST_AFRICA".to_string()),
            country: Some("ZA".to_string()),
            ..Default::default()
        };
        let result = search_assets(&store, &filters, &Pagination::default()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn scope_filter_returns_only_matching_assets() {
        let store = seeded_store().await;
        let filters = AssetSearchFilters { market_scope: Some(MarketScope::UsEu), ..Default::default() };
        let results = search_assets(&store, &filters, &Pagination::default()).await.unwrap();
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].asset_id, "AAPL.US");
    }

    #[tokio::test]
    async fn text_query_matches_symbol_case_insensitively() {
        let store = seeded_store().await;
        let filters = AssetSearchFilters { query: Some("aapl".to_string()), ..Default::default() };
        let results = search_assets(&store, &filters, &Pagination::default()).await.unwrap();
        assert_eq!(results.total, 1);
    }
}
