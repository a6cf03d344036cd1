// 🗂️ Account Resolver - plan type + owner → ledger account paths
//
// Paths are built as: category prefix / plan type [/ owner segment].
// The open plan is shared and never carries an owner segment. One asset
// account (the trust fund) lives outside that tree: whenever it shows up,
// both its parent and its revenue account are swapped for the trust paths.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::AccountChart;
use crate::error::{LedgerError, PipelineError};
use crate::store::{LedgerAccount, LedgerStore};

// ============================================================================
// PLAN TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanType {
    /// Non-registered, shared by all owners
    Open,
    /// Tax-free savings account
    Tfsa,
    /// Registered retirement savings plan
    Rrsp,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Open => "OPEN",
            PlanType::Tfsa => "TFSA",
            PlanType::Rrsp => "RRSP",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, PlanType::Open)
    }

    pub fn all() -> [PlanType; 3] {
        [PlanType::Open, PlanType::Tfsa, PlanType::Rrsp]
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(PlanType::Open),
            "TFSA" => Ok(PlanType::Tfsa),
            "RRSP" => Ok(PlanType::Rrsp),
            _ => Err(LedgerError::malformed("plan type", s)),
        }
    }
}

// ============================================================================
// ACCOUNT PATH
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountCategory {
    Asset,
    Revenue,
    Trust,
}

/// Hierarchical account name, e.g. `FAMILY:INVEST:OPEN:MFC 856`
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountPath(Vec<String>);

impl AccountPath {
    pub const SEPARATOR: char = ':';

    pub fn new<S: AsRef<str>>(segments: &[S]) -> Self {
        AccountPath(segments.iter().map(|s| s.as_ref().to_string()).collect())
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        AccountPath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment, the account's own name
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for AccountPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(":"))
    }
}

impl FromStr for AccountPath {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<String> = s
            .split(AccountPath::SEPARATOR)
            .map(|seg| seg.trim().to_string())
            .collect();
        if segments.iter().any(String::is_empty) {
            return Err(LedgerError::malformed("account path", s));
        }
        Ok(AccountPath(segments))
    }
}

// ============================================================================
// RESOLVED ACCOUNTS
// ============================================================================

/// Accounts resolved once per plan type
#[derive(Debug, Clone, PartialEq)]
pub struct PlanAccounts {
    pub plan: PlanType,
    pub asset_parent: AccountPath,
    pub revenue: LedgerAccount,
}

/// Accounts resolved for one fund of one record
#[derive(Debug, Clone, PartialEq)]
pub struct FundAccounts {
    /// `"{company} {fund code}"`, e.g. `MFC 856`
    pub name: String,
    pub asset: LedgerAccount,
    pub revenue: LedgerAccount,
    pub in_trust: bool,
}

// ============================================================================
// RESOLVER
// ============================================================================

pub struct AccountResolver<'a> {
    chart: &'a AccountChart,
}

impl<'a> AccountResolver<'a> {
    pub fn new(chart: &'a AccountChart) -> Self {
        AccountResolver { chart }
    }

    /// Build the path for a category without touching the store.
    pub fn category_path(
        &self,
        category: AccountCategory,
        plan: PlanType,
        owner: Option<&str>,
    ) -> Result<AccountPath, LedgerError> {
        let prefix = match category {
            AccountCategory::Asset => &self.chart.asset_prefix,
            AccountCategory::Revenue => &self.chart.revenue_prefix,
            AccountCategory::Trust => return Ok(AccountPath::new(&self.chart.trust_asset_parent)),
        };

        let mut path = AccountPath::new(prefix).child(plan.as_str());
        if !plan.is_open() {
            path = path.child(self.owner_segment(plan, owner)?);
        }
        Ok(path)
    }

    fn owner_segment(&self, plan: PlanType, owner: Option<&str>) -> Result<&'a str, LedgerError> {
        let unknown = || LedgerError::UnknownOwner {
            plan: plan.to_string(),
        };
        let owner = owner.map(str::trim).filter(|o| !o.is_empty()).ok_or_else(unknown)?;
        self.chart
            .owner_segments
            .get(owner)
            .map(String::as_str)
            .ok_or_else(unknown)
    }

    fn lookup<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        path: &AccountPath,
    ) -> Result<LedgerAccount, PipelineError> {
        match store.find_account(path)? {
            Some(account) => Ok(account),
            None => Err(LedgerError::AccountNotFound {
                path: path.to_string(),
            }
            .into()),
        }
    }

    /// Resolve the asset parent and the revenue account of a plan.
    pub fn plan_accounts<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        plan: PlanType,
        owner: Option<&str>,
    ) -> Result<PlanAccounts, PipelineError> {
        let revenue_path = self.category_path(AccountCategory::Revenue, plan, owner)?;
        let asset_parent = self.category_path(AccountCategory::Asset, plan, owner)?;
        let revenue = self.lookup(store, &revenue_path)?;

        debug!(%plan, revenue = %revenue.path, asset_parent = %asset_parent, "resolved plan accounts");

        Ok(PlanAccounts {
            plan,
            asset_parent,
            revenue,
        })
    }

    /// Resolve the asset account of one fund, applying the trust override.
    /// Evaluated for every record, never cached.
    pub fn fund_accounts<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        plan: &PlanAccounts,
        company: &str,
        fund_code: &str,
    ) -> Result<FundAccounts, PipelineError> {
        let name = format!("{} {}", company.trim(), fund_code.trim());
        let in_trust = name == self.chart.trust_asset_account;

        let (parent, revenue) = if in_trust {
            let trust_revenue = AccountPath::new(&self.chart.trust_revenue_account);
            (
                AccountPath::new(&self.chart.trust_asset_parent),
                self.lookup(store, &trust_revenue)?,
            )
        } else {
            (plan.asset_parent.clone(), plan.revenue.clone())
        };

        let asset = self.lookup(store, &parent.child(&name))?;
        debug!(account = %asset.path, in_trust, "resolved fund account");

        Ok(FundAccounts {
            name,
            asset,
            revenue,
            in_trust,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;

    fn chart() -> AccountChart {
        AccountChart::default().with_owner("Jane Q. Doe", "Jane")
    }

    fn ledger() -> MemoryLedger {
        let mut ledger = MemoryLedger::new();
        for path in [
            "REV_Invest:Dist:OPEN",
            "REV_Invest:Dist:TFSA:Jane",
            "REV_Invest:Trust Base",
        ] {
            ledger.open_account(path.parse().unwrap(), "CAD");
        }
        ledger.open_account("FAMILY:INVEST:OPEN:MFC 856".parse().unwrap(), "MFC_856");
        ledger.open_account(
            "TRUST:Trust Assets:Monarch ITF:CI Investments:CIG 18140".parse().unwrap(),
            "CIG_18140",
        );
        ledger
    }

    #[test]
    fn test_open_plan_has_no_owner_segment() {
        let chart = chart();
        let resolver = AccountResolver::new(&chart);
        let path = resolver
            .category_path(AccountCategory::Asset, PlanType::Open, None)
            .unwrap();
        assert_eq!(path.to_string(), "FAMILY:INVEST:OPEN");
    }

    #[test]
    fn test_registered_plan_appends_owner_segment() {
        let chart = chart();
        let resolver = AccountResolver::new(&chart);
        let path = resolver
            .category_path(AccountCategory::Revenue, PlanType::Tfsa, Some("Jane Q. Doe"))
            .unwrap();
        assert_eq!(path.to_string(), "REV_Invest:Dist:TFSA:Jane");
    }

    #[test]
    fn test_default_chart_resolves_statement_owners() {
        let chart = AccountChart::default();
        let resolver = AccountResolver::new(&chart);

        let mark = resolver
            .category_path(AccountCategory::Revenue, PlanType::Tfsa, Some("Mark H. Sattolo"))
            .unwrap();
        assert_eq!(mark.to_string(), "REV_Invest:Dist:TFSA:Mark");

        let lulu = resolver
            .category_path(AccountCategory::Asset, PlanType::Rrsp, Some("Louise Robb"))
            .unwrap();
        assert_eq!(lulu.to_string(), "FAMILY:INVEST:RRSP:Lulu");
    }

    #[test]
    fn test_registered_plan_without_owner_fails() {
        let chart = chart();
        let resolver = AccountResolver::new(&chart);

        for owner in [None, Some(""), Some("Somebody Else")] {
            let err = resolver
                .category_path(AccountCategory::Asset, PlanType::Rrsp, owner)
                .unwrap_err();
            assert_eq!(err, LedgerError::UnknownOwner { plan: "RRSP".to_string() });
        }
    }

    #[test]
    fn test_plan_accounts_missing_revenue_account() {
        let chart = chart();
        let resolver = AccountResolver::new(&chart);
        let ledger = ledger();

        let err = resolver
            .plan_accounts(&ledger, PlanType::Rrsp, Some("Jane Q. Doe"))
            .unwrap_err();
        match err {
            PipelineError::Record(LedgerError::AccountNotFound { path }) => {
                assert_eq!(path, "REV_Invest:Dist:RRSP:Jane")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_fund_accounts_regular() {
        let chart = chart();
        let resolver = AccountResolver::new(&chart);
        let ledger = ledger();

        let plan = resolver.plan_accounts(&ledger, PlanType::Open, None).unwrap();
        let fund = resolver.fund_accounts(&ledger, &plan, "MFC", "856").unwrap();

        assert_eq!(fund.name, "MFC 856");
        assert!(!fund.in_trust);
        assert_eq!(fund.asset.path.to_string(), "FAMILY:INVEST:OPEN:MFC 856");
        assert_eq!(fund.revenue.path.to_string(), "REV_Invest:Dist:OPEN");
    }

    #[test]
    fn test_fund_accounts_trust_override() {
        let chart = chart();
        let resolver = AccountResolver::new(&chart);
        let ledger = ledger();

        let plan = resolver.plan_accounts(&ledger, PlanType::Open, None).unwrap();
        let fund = resolver.fund_accounts(&ledger, &plan, "CIG", "18140").unwrap();

        assert!(fund.in_trust);
        assert_eq!(
            fund.asset.path.to_string(),
            "TRUST:Trust Assets:Monarch ITF:CI Investments:CIG 18140"
        );
        assert_eq!(fund.revenue.path.to_string(), "REV_Invest:Trust Base");

        // the override does not stick to the plan
        let regular = resolver.fund_accounts(&ledger, &plan, "MFC", "856").unwrap();
        assert_eq!(regular.revenue.path.to_string(), "REV_Invest:Dist:OPEN");
    }

    #[test]
    fn test_fund_account_not_found() {
        let chart = chart();
        let resolver = AccountResolver::new(&chart);
        let ledger = ledger();

        let plan = resolver.plan_accounts(&ledger, PlanType::Open, None).unwrap();
        let err = resolver.fund_accounts(&ledger, &plan, "TML", "704").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Record(LedgerError::AccountNotFound { ref path })
                if path == "FAMILY:INVEST:OPEN:TML 704"
        ));
    }

    #[test]
    fn test_account_path_parsing() {
        let path: AccountPath = "FAMILY:INVEST:OPEN".parse().unwrap();
        assert_eq!(path.segments().len(), 3);
        assert_eq!(path.name(), "OPEN");
        assert!("FAMILY::OPEN".parse::<AccountPath>().is_err());
        assert_eq!("tfsa".parse::<PlanType>().unwrap(), PlanType::Tfsa);
    }
}
