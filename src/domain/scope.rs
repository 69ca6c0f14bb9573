use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of market scopes. Every score, bar file, job run and
/// quality threshold is scope-qualified; publishing in one scope never
/// reads or writes rows of the other (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketScope {
    UsEu,
    Africa,
}

impl MarketScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketScope::UsEu => "US_EU",
            MarketScope::Africa => "AFRICA",
        }
    }

    /// Directory segment used under `<data>/parquet/<dir>/bars_daily/`.
    pub fn dir_name(&self) -> &'static str {
        match self {
            MarketScope::UsEu => "us_eu",
            MarketScope::Africa => "africa",
        }
    }

    pub fn all() -> [MarketScope; 2] {
        [MarketScope::UsEu, MarketScope::Africa]
    }
}

impl fmt::Display for MarketScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MarketScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "US_EU" | "US-EU" | "USEU" => Ok(MarketScope::UsEu),
            "AFRICA" => Ok(MarketScope::Africa),
            other => Err(format!("unknown market scope: {other}")),
        }
    }
}
