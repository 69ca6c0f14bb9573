use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use super::scope::MarketScope;

/// `asset_id := <symbol>.<exchange>` (spec §6 asset-id grammar).
pub type AssetId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetType {
    Equity,
    Etf,
    Crypto,
    Fx,
    Future,
    Option,
    Bond,
    Index,
    Fund,
    Commodity,
    Unknown,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Equity => "EQUITY",
            AssetType::Etf => "ETF",
            AssetType::Crypto => "CRYPTO",
            AssetType::Fx => "FX",
            AssetType::Future => "FUTURE",
            AssetType::Option => "OPTION",
            AssetType::Bond => "BOND",
            AssetType::Index => "INDEX",
            AssetType::Fund => "FUND",
            AssetType::Commodity => "COMMODITY",
            AssetType::Unknown => "UNKNOWN",
        }
    }

    /// Only EQUITY/FUND carry a Value pillar (spec §3).
    pub fn has_value_pillar(&self) -> bool {
        matches!(self, AssetType::Equity | AssetType::Fund)
    }

    /// ETFs skip Value but still use Momentum+Safety.
    pub fn is_momentum_safety_only(&self) -> bool {
        matches!(
            self,
            AssetType::Etf
                | AssetType::Fx
                | AssetType::Crypto
                | AssetType::Commodity
                | AssetType::Bond
                | AssetType::Option
                | AssetType::Future
        )
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EQUITY" => Ok(AssetType::Equity),
            "ETF" => Ok(AssetType::Etf),
            "CRYPTO" => Ok(AssetType::Crypto),
            "FX" => Ok(AssetType::Fx),
            "FUTURE" => Ok(AssetType::Future),
            "OPTION" => Ok(AssetType::Option),
            "BOND" => Ok(AssetType::Bond),
            "INDEX" => Ok(AssetType::Index),
            "FUND" => Ok(AssetType::Fund),
            "COMMODITY" => Ok(AssetType::Commodity),
            _ => Ok(AssetType::Unknown),
        }
    }
}

/// Liquidity class, 1 = most liquid. Drives whether an asset is active
/// by default (spec Glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
}

impl Tier {
    pub fn from_i32(v: i32) -> Tier {
        match v {
            1 => Tier::One,
            2 => Tier::Two,
            3 => Tier::Three,
            _ => Tier::Four,
        }
    }

    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Asset {
    pub asset_id: AssetId,
    pub symbol: String,
    pub name: String,
    pub asset_type: String,
    pub market_scope: String,
    pub market_code: String,
    pub exchange_code: String,
    pub currency: String,
    pub country: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub tier: i32,
    pub priority_level: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn new(
        asset_id: impl Into<String>,
        symbol: impl Into<String>,
        name: impl Into<String>,
        asset_type: AssetType,
        market_scope: MarketScope,
        exchange_code: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            asset_id: asset_id.into(),
            symbol: symbol.into(),
            name: name.into(),
            asset_type: asset_type.as_str().to_string(),
            market_scope: market_scope.as_str().to_string(),
            market_code: market_scope.as_str().to_string(),
            exchange_code: exchange_code.into(),
            currency: currency.into(),
            country: None,
            sector: None,
            industry: None,
            tier: Tier::Four.as_i32(),
            priority_level: 0,
            active: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn asset_type(&self) -> AssetType {
        AssetType::from_str(&self.asset_type).unwrap_or(AssetType::Unknown)
    }

    pub fn scope(&self) -> Option<MarketScope> {
        self.market_scope.parse().ok()
    }

    pub fn tier(&self) -> Tier {
        Tier::from_i32(self.tier)
    }
}
