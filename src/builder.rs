// 📒 Double-Entry Builder - normalized records → balanced ledger transactions
//
//   regular record:  asset split (gross, units)  + revenue split (-gross, reconciled)
//   switch pair:     outgoing asset split        + incoming asset split
//
// A transaction only leaves this module once its split values sum to exactly
// zero cents. Whether it is then written is decided by the run mode alone.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, RunMode};
use crate::error::{LedgerError, StoreError};
use crate::money::{Cents, Units};
use crate::parser::NormalizedTransaction;
use crate::reconciliation::SwitchPair;
use crate::store::{LedgerAccount, LedgerStore};

/// Joins the notes of the two legs of a switch
pub const NOTES_SEPARATOR: &str = " | ";

// ============================================================================
// SPLITS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitAction {
    Buy,
    Sell,
    Fee,
    /// Distribution, the default for units coming in from revenue
    Dist,
}

impl SplitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitAction::Buy => "Buy",
            SplitAction::Sell => "Sell",
            SplitAction::Fee => "Fee",
            SplitAction::Dist => "Dist",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub account: LedgerAccount,

    /// Value in the transaction currency
    pub value: Cents,

    /// Quantity of the account's commodity. `None` for currency accounts,
    /// where the amount is the value itself.
    pub amount: Option<Units>,

    pub action: Option<SplitAction>,
    pub memo: String,
    pub reconciled: bool,
}

impl Split {
    fn asset(tx: &NormalizedTransaction, action: SplitAction, memo: &str) -> Self {
        Split {
            account: tx.asset_account.clone(),
            value: tx.gross,
            amount: Some(tx.units),
            action: Some(action),
            memo: memo.to_string(),
            reconciled: false,
        }
    }

    pub fn is_asset_leg(&self) -> bool {
        self.amount.is_some()
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: Uuid,

    /// Statement records this transaction was built from:
    /// `{source}:{plan}:{seq}`, or `{source}:{plan}:{seq}+{seq}` for a switch
    pub origin: String,
    pub date: NaiveDate,
    pub currency: String,
    pub description: String,
    pub notes: String,
    pub splits: Vec<Split>,
}

impl LedgerTransaction {
    /// Signed sum of split values; zero when balanced
    pub fn imbalance(&self) -> Cents {
        self.splits.iter().map(|s| s.value).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.imbalance().is_zero()
    }

    /// Splits that move fund units
    pub fn asset_legs(&self) -> impl Iterator<Item = &Split> {
        self.splits.iter().filter(|s| s.is_asset_leg())
    }

    /// Hash of the originating records and the content. Re-importing the
    /// same statement yields the same fingerprint; two identical lines of
    /// one statement do not. The random id is not part of it.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}",
            self.origin, self.date, self.currency, self.description, self.notes
        ));
        for split in &self.splits {
            hasher.update(format!(
                "|{}|{}|{}",
                split.account.path,
                split.value.0,
                split.amount.map(|u| u.0.to_string()).unwrap_or_default()
            ));
        }
        format!("{:x}", hasher.finalize())
    }

    /// Reject the transaction unless its splits net to exactly zero.
    pub fn validate(self) -> Result<Self, LedgerError> {
        let residual = self.imbalance();
        if residual.is_zero() {
            Ok(self)
        } else {
            warn!(
                description = %self.description,
                residual = residual.0,
                "transaction imbalance, rolling back"
            );
            Err(LedgerError::ImbalancedTransaction { residual })
        }
    }
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct DoubleEntryBuilder<'a> {
    config: &'a EngineConfig,
    fee_marker: &'a str,

    /// Statement the records come from (batch source file)
    source: &'a str,
}

impl<'a> DoubleEntryBuilder<'a> {
    pub fn new(config: &'a EngineConfig, fee_marker: &'a str) -> Self {
        DoubleEntryBuilder {
            config,
            fee_marker,
            source: "",
        }
    }

    pub fn with_source(mut self, source: &'a str) -> Self {
        self.source = source;
        self
    }

    fn origin(&self, tx: &NormalizedTransaction) -> String {
        format!("{}:{}:{}", self.source, tx.plan, tx.seq)
    }

    /// Lower seq first, so both arrival orders name the pair the same way
    fn pair_origin(&self, pair: &SwitchPair) -> String {
        let (a, b) = (pair.outgoing.seq, pair.incoming.seq);
        format!(
            "{}:{}:{}+{}",
            self.source,
            pair.outgoing.plan,
            a.min(b),
            a.max(b)
        )
    }

    fn single_action(&self, tx: &NormalizedTransaction) -> SplitAction {
        if tx.description.contains(self.fee_marker) {
            SplitAction::Fee
        } else if tx.units.is_negative() {
            SplitAction::Sell
        } else {
            SplitAction::Dist
        }
    }

    /// One asset split against the given revenue account.
    pub fn build_single(
        &self,
        tx: &NormalizedTransaction,
        revenue: &LedgerAccount,
    ) -> Result<LedgerTransaction, LedgerError> {
        let splits = vec![
            Split::asset(tx, self.single_action(tx), ""),
            Split {
                account: revenue.clone(),
                value: -tx.gross,
                amount: None,
                action: None,
                memo: String::new(),
                reconciled: true,
            },
        ];

        LedgerTransaction {
            id: Uuid::new_v4(),
            origin: self.origin(tx),
            date: tx.trade_date,
            currency: self.config.currency.clone(),
            description: tx.description.clone(),
            notes: tx.notes.clone(),
            splits,
        }
        .validate()
    }

    /// Two asset splits, one per leg. Date and description come from the
    /// outgoing leg, so the result does not depend on arrival order.
    pub fn build_switch(&self, pair: &SwitchPair) -> Result<LedgerTransaction, LedgerError> {
        let leg_action = |leg: &NormalizedTransaction| {
            if leg.units.is_positive() {
                SplitAction::Buy
            } else {
                SplitAction::Sell
            }
        };

        let splits = pair
            .legs()
            .into_iter()
            .map(|leg| Split::asset(leg, leg_action(leg), &leg.notes))
            .collect();

        LedgerTransaction {
            id: Uuid::new_v4(),
            origin: self.pair_origin(pair),
            date: pair.outgoing.trade_date,
            currency: self.config.currency.clone(),
            description: pair.outgoing.description.clone(),
            notes: format!(
                "{}{}{}",
                pair.outgoing.notes, NOTES_SEPARATOR, pair.incoming.notes
            ),
            splits,
        }
        .validate()
    }
}

// ============================================================================
// COMMIT POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Written to the ledger store
    Committed,
    /// PROD, but the same transaction is already in the ledger
    AlreadyRecorded,
    /// TEST: validated and discarded
    DryRun,
}

/// Submit a validated transaction in PROD; discard it otherwise.
pub fn commit_transaction<S: LedgerStore + ?Sized>(
    tx: &LedgerTransaction,
    mode: RunMode,
    store: &mut S,
) -> Result<Disposition, StoreError> {
    if !mode.persists() {
        info!(mode = %mode, description = %tx.description, "roll back transaction changes");
        return Ok(Disposition::DryRun);
    }

    if store.record_transaction(tx)? {
        info!(mode = %mode, id = %tx.id, description = %tx.description, "committed transaction");
        Ok(Disposition::Committed)
    } else {
        warn!(description = %tx.description, "transaction already recorded, skipped");
        Ok(Disposition::AlreadyRecorded)
    }
}

// ============================================================================
// TESTS
// ============================================================================
