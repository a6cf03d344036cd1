// 📥 Batch input - the record collection handed over by the statement scanner
//
// JSON envelope (what the scanner writes):
//
//   { "Owner": "...", "Source File": "...", "Date": "...",
//     "Plan Data": { "OPEN": [ {record}, ... ], "TFSA": [...], "RRSP": [...] } }
//
// or a flat CSV with one record per row and a "Plan Type" column.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::accounts::PlanType;
use crate::parser::RawTransaction;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchInput {
    /// Statement owner; required for every plan type except OPEN
    #[serde(rename = "Owner", default)]
    pub owner: String,

    #[serde(rename = "Source File", default)]
    pub source: String,

    /// When the scanner produced the batch (free text)
    #[serde(rename = "Date", default)]
    pub date: String,

    /// Records per plan type, each list in statement order
    #[serde(rename = "Plan Data", default)]
    pub plans: BTreeMap<PlanType, Vec<RawTransaction>>,
}

impl BatchInput {
    pub fn new(owner: &str, source: &str) -> Self {
        BatchInput {
            owner: owner.to_string(),
            source: source.to_string(),
            date: Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            plans: BTreeMap::new(),
        }
    }

    pub fn with_record(mut self, plan: PlanType, raw: RawTransaction) -> Self {
        self.push(plan, raw);
        self
    }

    pub fn push(&mut self, plan: PlanType, raw: RawTransaction) {
        self.plans.entry(plan).or_default().push(raw);
    }

    /// Owner on record, if any
    pub fn owner(&self) -> Option<&str> {
        Some(self.owner.trim()).filter(|o| !o.is_empty())
    }

    pub fn record_count(&self) -> usize {
        self.plans.values().map(Vec::len).sum()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn load_batch_json(path: &Path) -> Result<BatchInput> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;
    let mut batch: BatchInput =
        serde_json::from_str(&text).context("Failed to parse batch JSON")?;

    if batch.source.is_empty() {
        batch.source = file_name(path);
    }

    info!(
        source = %batch.source,
        records = batch.record_count(),
        "loaded batch"
    );
    Ok(batch)
}

/// Flat CSV, grouped by plan type with arrival order kept inside each group.
pub fn load_batch_csv(path: &Path, owner: &str) -> Result<BatchInput> {
    let mut rdr = csv::Reader::from_path(path).context("Failed to open CSV file")?;
    let mut batch = BatchInput::new(owner, &file_name(path));

    for (line, result) in rdr.deserialize().enumerate() {
        let raw: RawTransaction = result.context("Failed to deserialize record")?;
        let Some(plan) = raw.plan_type else {
            bail!("Record on row {} has no Plan Type", line + 1);
        };
        batch.push(plan, raw);
    }

    info!(
        source = %batch.source,
        records = batch.record_count(),
        "loaded batch"
    );
    Ok(batch)
}

/// Pick the loader by file extension.
pub fn load_batch(path: &Path, owner: Option<&str>) -> Result<BatchInput> {
    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        load_batch_csv(path, owner.unwrap_or_default())
    } else {
        let mut batch = load_batch_json(path)?;
        if let Some(owner) = owner {
            batch.owner = owner.to_string();
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("fund-ledger-batch-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_json_envelope() {
        let path = temp_file(
            "monarch.json",
            r#"{
                "__class__": "InvestmentRecord",
                "Owner": "Jane Q. Doe",
                "Source File": "statement-2019.txt",
                "Date": "2019-04-01T10:00:00",
                "Size": "3",
                "Plan Data": {
                    "OPEN": [
                        {"Fund Company": "MFC", "Fund Code": "856", "Description": "Reinvested Distribution",
                         "Trade Date": "03/15/2019", "Gross": "$12.34", "Units": "1.2340",
                         "Unit Balance": "1,234.5678"}
                    ],
                    "TFSA": [],
                    "RRSP": [
                        {"Fund Company": "TML", "Fund Code": "704", "Description": "Switch-Out",
                         "Trade Date": "15-Mar-2019", "Gross": "($500.00)", "Units": "-100.0000"},
                        {"Fund Company": "TML", "Fund Code": "180", "Description": "Switch-In",
                         "Trade Date": "15-Mar-2019", "Gross": "$500.00", "Units": "100.0000"}
                    ]
                }
            }"#,
        );

        let batch = load_batch_json(&path).unwrap();
        assert_eq!(batch.owner(), Some("Jane Q. Doe"));
        assert_eq!(batch.source, "statement-2019.txt");
        assert_eq!(batch.record_count(), 3);
        assert_eq!(batch.plans[&PlanType::Open][0].unit_balance.as_deref(), Some("1,234.5678"));
        assert_eq!(batch.plans[&PlanType::Rrsp][1].description, "Switch-In");

        fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_empty_owner_is_none() {
        let batch = BatchInput::new("  ", "x");
        assert_eq!(batch.owner(), None);
    }

    #[test]
    fn test_csv_grouped_by_plan_in_order() {
        let path = temp_file(
            "records.csv",
            "Plan Type,Fund Company,Fund Code,Description,Trade Date,Gross,Units,Unit Balance,Load\n\
             OPEN,MFC,856,Reinvested Distribution,03/15/2019,$12.34,1.2340,,\n\
             TFSA,MFC,856,Switch-Out,03/15/2019,($500.00),-100.0000,,\n\
             OPEN,MFC,6130,Fee Redemption,03/16/2019,($1.00),-0.1000,,DSC\n\
             TFSA,MFC,6130,Switch-In,03/15/2019,$500.00,100.0000,,\n",
        );

        let batch = load_batch_csv(&path, "Jane Q. Doe").unwrap();
        assert_eq!(batch.source, "records.csv");
        assert_eq!(batch.plans[&PlanType::Open].len(), 2);
        assert_eq!(batch.plans[&PlanType::Open][1].fund_code, "6130");
        assert_eq!(batch.plans[&PlanType::Open][1].load.as_deref(), Some("DSC"));
        assert_eq!(batch.plans[&PlanType::Open][0].load, None);
        assert_eq!(batch.plans[&PlanType::Tfsa][0].description, "Switch-Out");

        fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_csv_requires_plan_type() {
        let path = temp_file(
            "records.csv",
            "Plan Type,Fund Company,Fund Code,Description,Trade Date,Gross,Units\n\
             ,MFC,856,Reinvested Distribution,03/15/2019,$12.34,1.2340\n",
        );

        assert!(load_batch_csv(&path, "").is_err());
        fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }
}
