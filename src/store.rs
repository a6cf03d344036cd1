// 🏦 Ledger store seam
//
// The engine never owns persistence. It looks accounts up and submits
// finished transactions and prices through LedgerStore; db.rs provides the
// SQLite session and MemoryLedger below serves dry runs and tests.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::accounts::AccountPath;
use crate::builder::LedgerTransaction;
use crate::error::StoreError;
use crate::pricing::PriceObservation;

/// An account as the ledger knows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub path: AccountPath,

    /// Commodity held in the account (a fund symbol, or the currency)
    pub commodity: String,
}

pub trait LedgerStore {
    /// Blocking lookup by full path; `None` when the account does not exist
    fn find_account(&self, path: &AccountPath) -> Result<Option<LedgerAccount>, StoreError>;

    /// Persist one balanced transaction with all its splits, or nothing.
    /// Returns false when the same transaction was already recorded.
    fn record_transaction(&mut self, tx: &LedgerTransaction) -> Result<bool, StoreError>;

    fn record_price(&mut self, price: &PriceObservation) -> Result<(), StoreError>;
}

// ============================================================================
// IN-MEMORY LEDGER
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryLedger {
    accounts: BTreeMap<AccountPath, LedgerAccount>,
    transactions: Vec<LedgerTransaction>,
    fingerprints: HashSet<String>,
    prices: Vec<PriceObservation>,
    mutations: usize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account setup is not counted as a mutation: it models the ledger's
    /// state before the batch runs.
    pub fn open_account(&mut self, path: AccountPath, commodity: &str) {
        self.accounts.insert(
            path.clone(),
            LedgerAccount {
                path,
                commodity: commodity.to_string(),
            },
        );
    }

    pub fn transactions(&self) -> &[LedgerTransaction] {
        &self.transactions
    }

    pub fn prices(&self) -> &[PriceObservation] {
        &self.prices
    }

    /// Number of write calls that reached the store
    pub fn mutations(&self) -> usize {
        self.mutations
    }
}

impl LedgerStore for MemoryLedger {
    fn find_account(&self, path: &AccountPath) -> Result<Option<LedgerAccount>, StoreError> {
        Ok(self.accounts.get(path).cloned())
    }

    fn record_transaction(&mut self, tx: &LedgerTransaction) -> Result<bool, StoreError> {
        self.mutations += 1;
        if !self.fingerprints.insert(tx.fingerprint()) {
            return Ok(false);
        }
        self.transactions.push(tx.clone());
        Ok(true)
    }

    fn record_price(&mut self, price: &PriceObservation) -> Result<(), StoreError> {
        self.mutations += 1;
        self.prices.push(price.clone());
        Ok(())
    }
}
