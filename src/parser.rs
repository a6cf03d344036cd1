// 🧾 Field Normalizer - raw statement records → typed, fixed-point records
//
// Raw records come from the statement scanner (text copied out of a PDF, or
// pasted from the web statement). Every field is still a string. This module
// turns them into NormalizedTransaction: exact integers for money and units,
// a calendar date, the switch flag and the composed description/notes.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

use crate::accounts::{FundAccounts, PlanType};
use crate::config::AccountChart;
use crate::error::LedgerError;
use crate::money::{parse_money, parse_units, Cents, Units};
use crate::store::LedgerAccount;

// ============================================================================
// RAW RECORD
// ============================================================================

/// RawTransaction - one statement line exactly as the scanner produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    #[serde(rename = "Fund Company")]
    pub fund_company: String,

    #[serde(rename = "Fund Code")]
    pub fund_code: String,

    #[serde(rename = "Description")]
    pub description: String,

    #[serde(rename = "Trade Date")]
    pub trade_date: String,

    #[serde(rename = "Gross")]
    pub gross: String,

    #[serde(rename = "Units")]
    pub units: String,

    // Optional fields (depends on the statement format)
    #[serde(rename = "Unit Balance", default, skip_serializing_if = "Option::is_none")]
    pub unit_balance: Option<String>,

    #[serde(rename = "Load", default, skip_serializing_if = "Option::is_none")]
    pub load: Option<String>,

    #[serde(rename = "Owner", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Filled from the batch envelope when the record sits under a plan key
    #[serde(rename = "Plan Type", default, skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<PlanType>,
}

impl RawTransaction {
    pub fn new(
        fund_company: &str,
        fund_code: &str,
        description: &str,
        trade_date: &str,
        gross: &str,
        units: &str,
    ) -> Self {
        RawTransaction {
            fund_company: fund_company.to_string(),
            fund_code: fund_code.to_string(),
            description: description.to_string(),
            trade_date: trade_date.to_string(),
            gross: gross.to_string(),
            units: units.to_string(),
            unit_balance: None,
            load: None,
            owner: None,
            plan_type: None,
        }
    }

    /// Builder pattern: add unit balance text
    pub fn with_unit_balance(mut self, balance: &str) -> Self {
        self.unit_balance = Some(balance.to_string());
        self
    }

    /// Builder pattern: add load text
    pub fn with_load(mut self, load: &str) -> Self {
        self.load = Some(load.to_string());
        self
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    pub fn with_plan_type(mut self, plan: PlanType) -> Self {
        self.plan_type = Some(plan);
        self
    }
}

// ============================================================================
// FIELD PARSERS
// ============================================================================

/// Parse `MM/DD/YYYY` (PDF text) or `DD-Mon-YYYY` (web copy) into a date.
pub fn parse_trade_date(text: &str) -> Result<NaiveDate, LedgerError> {
    let text = text.trim();

    if text.contains('/') {
        if let Ok(date) = NaiveDate::parse_from_str(text, "%m/%d/%Y") {
            return Ok(date);
        }
    } else if text.contains('-') {
        if let Ok(date) = NaiveDate::parse_from_str(text, "%d-%b-%Y") {
            return Ok(date);
        }
    }

    Err(LedgerError::malformed("trade date", text))
}

fn switch_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(Switch|Internal Transfer)-(In|in|Out|out)")
            .expect("switch pattern is a valid regex")
    })
}

/// Switches move value between two funds and never touch revenue.
/// Decided on the description text alone.
pub fn is_switch(description: &str) -> bool {
    switch_pattern().is_match(description.trim_start())
}

/// Numeric and calendar fields of a record, before account resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedFields {
    pub trade_date: NaiveDate,
    pub gross: Cents,
    pub units: Units,
    pub is_switch: bool,
}

pub fn parse_fields(raw: &RawTransaction) -> Result<ParsedFields, LedgerError> {
    let trade_date = parse_trade_date(&raw.trade_date)?;
    let gross = parse_money(&raw.gross)?;
    let units = parse_units(&raw.units)?;
    let is_switch = is_switch(&raw.description);

    debug!(
        date = %trade_date,
        gross = gross.0,
        units = units.0,
        is_switch,
        "parsed record fields"
    );

    Ok(ParsedFields {
        trade_date,
        gross,
        units,
        is_switch,
    })
}

// ============================================================================
// NORMALIZED RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTransaction {
    /// Arrival position within its plan type
    pub seq: usize,
    pub plan: PlanType,
    pub trade_date: NaiveDate,
    pub gross: Cents,
    pub units: Units,
    pub is_switch: bool,
    pub fund_company: String,
    pub description: String,
    pub notes: String,
    pub asset_account: LedgerAccount,

    /// Absent for switches: they only move value between asset accounts
    pub revenue_account: Option<LedgerAccount>,
}

impl NormalizedTransaction {
    pub fn trade_day(&self) -> u32 {
        self.trade_date.day()
    }

    pub fn trade_month(&self) -> u32 {
        self.trade_date.month()
    }

    pub fn trade_year(&self) -> i32 {
        self.trade_date.year()
    }
}

pub struct FieldNormalizer<'a> {
    chart: &'a AccountChart,
}

impl<'a> FieldNormalizer<'a> {
    pub fn new(chart: &'a AccountChart) -> Self {
        FieldNormalizer { chart }
    }

    /// Combine parsed fields and resolved accounts into the typed record.
    pub fn normalize(
        &self,
        raw: &RawTransaction,
        plan: PlanType,
        seq: usize,
        fields: ParsedFields,
        fund: FundAccounts,
    ) -> Result<NormalizedTransaction, LedgerError> {
        let company = raw.fund_company.trim();
        let company_name = self
            .chart
            .company_name(company)
            .ok_or_else(|| LedgerError::malformed("fund company", company))?;

        let description = format!("{}: {} {}", company_name, raw.description.trim(), fund.name);
        let notes = compose_notes(&fund.name, raw);

        Ok(NormalizedTransaction {
            seq,
            plan,
            trade_date: fields.trade_date,
            gross: fields.gross,
            units: fields.units,
            is_switch: fields.is_switch,
            fund_company: company.to_string(),
            description,
            notes,
            asset_account: fund.asset,
            revenue_account: if fields.is_switch {
                None
            } else {
                Some(fund.revenue)
            },
        })
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn compose_notes(account_name: &str, raw: &RawTransaction) -> String {
    if let Some(balance) = non_empty(&raw.unit_balance) {
        format!("{} balance = {}", account_name, balance)
    } else if let Some(load) = non_empty(&raw.load) {
        format!("{} load = {}", account_name, load)
    } else {
        account_name.to_string()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountPath;

    fn fund(name: &str) -> FundAccounts {
        FundAccounts {
            name: name.to_string(),
            asset: LedgerAccount {
                path: AccountPath::new(&["FAMILY", "INVEST", "OPEN", name]),
                commodity: name.replace(' ', "_"),
            },
            revenue: LedgerAccount {
                path: AccountPath::new(&["REV_Invest", "Dist", "OPEN"]),
                commodity: "CAD".to_string(),
            },
            in_trust: false,
        }
    }

    #[test]
    fn test_parse_slash_date() {
        let date = parse_trade_date("03/15/2019").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2019, 3, 15).unwrap());
    }

    #[test]
    fn test_parse_textual_month_date() {
        let date = parse_trade_date("15-Mar-2019").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2019, 3, 15).unwrap());
        assert_eq!(
            parse_trade_date("02-Jan-2020").unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()
        );
    }

    #[test]
    fn test_parse_date_rejects_unknown_shapes() {
        for bad in ["2019-03-15", "15 Mar 2019", "13/45/2019", "Mar-15-2019", ""] {
            assert!(
                matches!(parse_trade_date(bad), Err(LedgerError::MalformedField { .. })),
                "expected failure for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_switch_detection_is_textual() {
        assert!(is_switch("Switch-In"));
        assert!(is_switch("Switch-out"));
        assert!(is_switch("Internal Transfer-Out to plan 123"));
        assert!(is_switch("Internal Transfer-In"));
        assert!(!is_switch("switch-in"));
        assert!(!is_switch("Reinvested Distribution"));
        assert!(!is_switch("Fee Redemption"));
        assert!(!is_switch("Automatic Switch-In"));
    }

    #[test]
    fn test_parse_fields() {
        let raw = RawTransaction::new("MFC", "856", "Switch-In", "15-Mar-2019", "$500.00", "100.0000");
        let fields = parse_fields(&raw).unwrap();
        assert_eq!(fields.gross, Cents(50000));
        assert_eq!(fields.units, Units(1_000_000));
        assert!(fields.is_switch);
    }

    #[test]
    fn test_parse_fields_reports_first_bad_field() {
        let raw = RawTransaction::new("MFC", "856", "Fee Redemption", "03/15/2019", "$5.0", "-1.0000");
        let err = parse_fields(&raw).unwrap_err();
        assert_eq!(err, LedgerError::malformed("gross", "$5.0"));
    }

    #[test]
    fn test_normalize_composes_description_and_notes() {
        let chart = AccountChart::default();
        let normalizer = FieldNormalizer::new(&chart);
        let raw = RawTransaction::new(
            "MFC",
            "856",
            "Reinvested Distribution",
            "03/15/2019",
            "$12.34",
            "1.2340",
        )
        .with_unit_balance("1,234.5678");

        let fields = parse_fields(&raw).unwrap();
        let tx = normalizer
            .normalize(&raw, PlanType::Open, 4, fields, fund("MFC 856"))
            .unwrap();

        assert_eq!(
            tx.description,
            "Mackenzie Financial Corp: Reinvested Distribution MFC 856"
        );
        assert_eq!(tx.notes, "MFC 856 balance = 1,234.5678");
        assert_eq!(tx.seq, 4);
        assert_eq!((tx.trade_day(), tx.trade_month(), tx.trade_year()), (15, 3, 2019));
        assert!(tx.revenue_account.is_some());
    }

    #[test]
    fn test_normalize_switch_has_no_revenue_account() {
        let chart = AccountChart::default();
        let normalizer = FieldNormalizer::new(&chart);
        let raw = RawTransaction::new("TML", "704", "Switch-out", "15-Mar-2019", "-$500.00", "-100.0000")
            .with_load("0.00%");

        let fields = parse_fields(&raw).unwrap();
        let tx = normalizer
            .normalize(&raw, PlanType::Open, 0, fields, fund("TML 704"))
            .unwrap();

        assert!(tx.is_switch);
        assert!(tx.revenue_account.is_none());
        assert_eq!(tx.notes, "TML 704 load = 0.00%");
        // sign relationship is kept exactly as parsed
        assert_eq!(tx.gross, Cents(-50000));
        assert_eq!(tx.units, Units(-1_000_000));
    }

    #[test]
    fn test_normalize_unknown_company() {
        let chart = AccountChart::default();
        let normalizer = FieldNormalizer::new(&chart);
        let raw = RawTransaction::new("XYZ", "1", "Purchase", "03/15/2019", "$1.00", "1.0000");
        let fields = parse_fields(&raw).unwrap();
        let err = normalizer
            .normalize(&raw, PlanType::Open, 0, fields, fund("XYZ 1"))
            .unwrap_err();
        assert_eq!(err, LedgerError::malformed("fund company", "XYZ"));
    }
}
