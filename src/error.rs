// ⚠️ Error kinds for the reconciliation engine
//
// LedgerError is scoped to one record: the orchestrator catches it, records
// the outcome and moves on. StoreError is scoped to the whole session and
// aborts the batch (the outer session is rolled back).

use serde::Serialize;
use thiserror::Error;

use crate::money::Cents;

// ============================================================================
// PER-TRANSACTION ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind")]
pub enum LedgerError {
    /// Money, units or date text did not match the accepted shapes
    #[error("malformed {field}: '{value}'")]
    MalformedField { field: String, value: String },

    /// A non-open plan type was requested but the batch has no owner on record
    #[error("plan type '{plan}' needs an owner but none is on record")]
    UnknownOwner { plan: String },

    /// The resolved account path does not exist in the ledger store
    #[error("account '{path}' not found in ledger")]
    AccountNotFound { path: String },

    /// Split values did not net to zero; residual is exact, in cents
    #[error("transaction imbalance of {residual} cents, rolled back")]
    ImbalancedTransaction { residual: Cents },

    /// Units were exactly zero, so no per-unit price exists
    #[error("cannot derive price for '{account}': units are zero")]
    DivisionByZero { account: String },

    /// A switch leg never found its counter-leg before the batch ended
    #[error("unmatched switch in plan '{plan}': {description}")]
    UnmatchedSwitch { plan: String, description: String },
}

impl LedgerError {
    pub fn malformed(field: &str, value: &str) -> Self {
        LedgerError::MalformedField {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Short machine-friendly name, used in logs and summaries
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::MalformedField { .. } => "MalformedField",
            LedgerError::UnknownOwner { .. } => "UnknownOwner",
            LedgerError::AccountNotFound { .. } => "AccountNotFound",
            LedgerError::ImbalancedTransaction { .. } => "ImbalancedTransaction",
            LedgerError::DivisionByZero { .. } => "DivisionByZero",
            LedgerError::UnmatchedSwitch { .. } => "UnmatchedSwitch",
        }
    }
}

// ============================================================================
// SESSION-LEVEL ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ledger database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Either kind, so one `?` chain can carry both; the orchestrator splits
/// them back apart at its per-transaction boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Record(#[from] LedgerError),

    #[error(transparent)]
    Session(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LedgerError::malformed("gross", "$12.3");
        assert_eq!(err.to_string(), "malformed gross: '$12.3'");
        assert_eq!(err.kind(), "MalformedField");

        let err = LedgerError::ImbalancedTransaction { residual: Cents(-5) };
        assert_eq!(
            err.to_string(),
            "transaction imbalance of -5 cents, rolled back"
        );
    }

    #[test]
    fn test_error_serializes_with_kind_tag() {
        let err = LedgerError::UnknownOwner { plan: "TFSA".to_string() };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "UnknownOwner");
        assert_eq!(json["plan"], "TFSA");
    }
}
