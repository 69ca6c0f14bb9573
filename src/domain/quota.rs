use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Plan {
    Free,
    Monthly,
    Yearly,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Monthly => "monthly",
            Plan::Yearly => "yearly",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }

    /// spec §3: free=3, paid=200, annual-pro effectively unlimited.
    pub fn daily_limit(&self) -> Option<i64> {
        match self {
            Plan::Free => Some(3),
            Plan::Monthly | Plan::Pro => Some(200),
            Plan::Yearly | Plan::Enterprise => None,
        }
    }

    pub fn bypasses_quota(&self) -> bool {
        self.daily_limit().is_none()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "monthly" => Ok(Plan::Monthly),
            "yearly" => Ok(Plan::Yearly),
            "pro" => Ok(Plan::Pro),
            "enterprise" => Ok(Plan::Enterprise),
            other => Err(format!("unknown plan: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuota {
    pub user_id: String,
    pub plan: String,
    pub date: NaiveDate,
    pub daily_used: i64,
}

impl UserQuota {
    pub fn plan(&self) -> Plan {
        self.plan.parse().unwrap_or(Plan::Free)
    }

    pub fn daily_limit(&self) -> Option<i64> {
        self.plan().daily_limit()
    }

    pub fn exhausted(&self) -> bool {
        match self.daily_limit() {
            Some(limit) => self.daily_used >= limit,
            None => false,
        }
    }
}
