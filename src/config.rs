// ⚙️ Configuration - run mode, engine settings and the account chart
//
// Nothing in here is global: the orchestrator owns one EngineConfig and one
// AccountChart per batch and hands references to every component that needs
// them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// RUN MODE
// ============================================================================

/// TEST validates everything and persists nothing; PROD persists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunMode {
    #[default]
    Test,
    Prod,
}

impl RunMode {
    pub fn persists(&self) -> bool {
        matches!(self, RunMode::Prod)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Test => "TEST",
            RunMode::Prod => "PROD",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" => Ok(RunMode::Test),
            "prod" => Ok(RunMode::Prod),
            other => Err(anyhow::anyhow!(
                "unknown run mode '{}', expected 'test' or 'prod'",
                other
            )),
        }
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub mode: RunMode,

    /// Currency every transaction and price is denominated in
    pub currency: String,

    /// Source tag attached to every price observation
    pub price_source: String,

    /// Type tag attached to every price observation
    pub price_type: String,

    /// Also require equal trade years when pairing switches.
    /// Off by default: statements only pair on day and month.
    #[serde(default)]
    pub match_trade_year: bool,
}

impl EngineConfig {
    pub fn new(mode: RunMode) -> Self {
        EngineConfig {
            mode,
            ..Default::default()
        }
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }

    pub fn with_trade_year_matching(mut self, strict: bool) -> Self {
        self.match_trade_year = strict;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            mode: RunMode::Test,
            currency: "CAD".to_string(),
            price_source: "user:price".to_string(),
            price_type: "nav".to_string(),
            match_trade_year: false,
        }
    }
}

// ============================================================================
// ACCOUNT CHART
// ============================================================================

/// Where the fund accounts live in the ledger's account tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountChart {
    /// Prefix of every revenue account, followed by plan type [+ owner]
    pub revenue_prefix: Vec<String>,

    /// Prefix of every asset parent, followed by plan type [+ owner]
    pub asset_prefix: Vec<String>,

    /// Statement owner name -> owner segment in the account tree
    #[serde(default)]
    pub owner_segments: BTreeMap<String, String>,

    /// Asset account that is held in trust
    pub trust_asset_account: String,

    /// Parent of the trust asset account
    pub trust_asset_parent: Vec<String>,

    /// Revenue account used for the trust asset
    pub trust_revenue_account: Vec<String>,

    /// Fund company code -> display name used in descriptions
    pub company_names: BTreeMap<String, String>,

    /// Descriptions containing this marker are fees
    pub fee_marker: String,
}

impl AccountChart {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read account chart: {}", path.display()))?;
        let chart: AccountChart = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse account chart: {}", path.display()))?;
        Ok(chart)
    }

    pub fn with_owner(mut self, owner: &str, segment: &str) -> Self {
        self.owner_segments
            .insert(owner.to_string(), segment.to_string());
        self
    }

    pub fn company_name(&self, code: &str) -> Option<&str> {
        self.company_names.get(code).map(String::as_str)
    }
}

impl Default for AccountChart {
    fn default() -> Self {
        let company_names = [
            ("ATL", "CIBC Asset Management"),
            ("CIG", "CI Investments"),
            ("DYN", "Dynamic Funds"),
            ("MFC", "Mackenzie Financial Corp"),
            ("MMF", "Manulife Mutual Funds"),
            ("TML", "Franklin Templeton"),
        ]
        .into_iter()
        .map(|(code, name)| (code.to_string(), name.to_string()))
        .collect();

        let owner_segments = [("Mark H. Sattolo", "Mark"), ("Louise Robb", "Lulu")]
            .into_iter()
            .map(|(owner, segment)| (owner.to_string(), segment.to_string()))
            .collect();

        let path = |parts: &[&str]| parts.iter().map(|p| p.to_string()).collect::<Vec<_>>();

        AccountChart {
            revenue_prefix: path(&["REV_Invest", "Dist"]),
            asset_prefix: path(&["FAMILY", "INVEST"]),
            owner_segments,
            trust_asset_account: "CIG 18140".to_string(),
            trust_asset_parent: path(&["TRUST", "Trust Assets", "Monarch ITF", "CI Investments"]),
            trust_revenue_account: path(&["REV_Invest", "Trust Base"]),
            company_names,
            fee_marker: "Fee".to_string(),
        }
    }
}
