// 🗄️ SQLite ledger - the persistent LedgerStore
//
// One import = one outer SQLite transaction (the scoped session). Every
// ledger transaction is written inside its own SAVEPOINT so a failing insert
// never leaves half its splits behind. Nothing reaches disk unless the
// session is finished in PROD.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::accounts::AccountPath;
use crate::builder::{LedgerTransaction, Split, SplitAction};
use crate::config::RunMode;
use crate::error::StoreError;
use crate::money::{Cents, Units};
use crate::pricing::{PriceObservation, PRICE_DENOM};
use crate::store::{LedgerAccount, LedgerStore};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn setup_ledger(conn: &Connection) -> Result<(), StoreError> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT UNIQUE NOT NULL,
            commodity TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tx_guid TEXT UNIQUE NOT NULL,
            fingerprint TEXT UNIQUE NOT NULL,
            origin TEXT NOT NULL,
            date TEXT NOT NULL,
            currency TEXT NOT NULL,
            description TEXT NOT NULL,
            notes TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS splits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            transaction_id INTEGER NOT NULL REFERENCES ledger_transactions(id),
            position INTEGER NOT NULL,
            account_path TEXT NOT NULL,
            commodity TEXT NOT NULL,
            value_cents INTEGER NOT NULL,
            amount_units INTEGER,
            action TEXT,
            memo TEXT NOT NULL,
            reconciled INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS prices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_path TEXT NOT NULL,
            commodity TEXT NOT NULL,
            currency TEXT NOT NULL,
            date TEXT NOT NULL,
            value_num INTEGER NOT NULL,
            value_denom INTEGER NOT NULL,
            source TEXT NOT NULL,
            kind TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_splits_transaction ON splits(transaction_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_prices_commodity ON prices(commodity, date)",
        [],
    )?;

    Ok(())
}

/// Create an account if it does not exist yet. Returns true when created.
pub fn open_account(conn: &Connection, path: &AccountPath, commodity: &str) -> Result<bool, StoreError> {
    let created = conn.execute(
        "INSERT OR IGNORE INTO accounts (path, commodity) VALUES (?1, ?2)",
        params![path.to_string(), commodity],
    )?;
    Ok(created > 0)
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    #[serde(rename = "Account")]
    account: String,

    #[serde(rename = "Commodity")]
    commodity: String,
}

/// Read an account chart seed: columns `Account` (colon path) and `Commodity`.
pub fn load_accounts_csv(csv_path: &Path) -> Result<Vec<LedgerAccount>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open accounts CSV")?;

    let mut accounts = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let row: AccountRow = result.context("Failed to deserialize account row")?;
        let path = row
            .account
            .parse::<AccountPath>()
            .with_context(|| format!("Invalid account path on row {}", line + 1))?;
        accounts.push(LedgerAccount {
            path,
            commodity: row.commodity.trim().to_string(),
        });
    }

    Ok(accounts)
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn count_transactions(conn: &Connection) -> Result<i64, StoreError> {
    let count = conn.query_row("SELECT COUNT(*) FROM ledger_transactions", [], |row| row.get(0))?;
    Ok(count)
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn date_column(row: &Row, column: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(column)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| conversion_error(column, e))
}

fn path_column(row: &Row, column: usize) -> rusqlite::Result<AccountPath> {
    let text: String = row.get(column)?;
    text.parse().map_err(|e| conversion_error(column, e))
}

fn action_to_str(action: Option<SplitAction>) -> Option<&'static str> {
    action.map(|a| a.as_str())
}

fn action_from_str(text: Option<String>) -> Option<SplitAction> {
    match text.as_deref() {
        Some("Buy") => Some(SplitAction::Buy),
        Some("Sell") => Some(SplitAction::Sell),
        Some("Fee") => Some(SplitAction::Fee),
        Some("Dist") => Some(SplitAction::Dist),
        _ => None,
    }
}

/// All recorded transactions with their splits, in insertion order.
pub fn get_transactions(conn: &Connection) -> Result<Vec<LedgerTransaction>, StoreError> {
    let mut tx_stmt = conn.prepare(
        "SELECT id, tx_guid, origin, date, currency, description, notes
         FROM ledger_transactions ORDER BY id",
    )?;
    let mut split_stmt = conn.prepare(
        "SELECT account_path, commodity, value_cents, amount_units, action, memo, reconciled
         FROM splits WHERE transaction_id = ?1 ORDER BY position",
    )?;

    let headers = tx_stmt
        .query_map([], |row| {
            let guid: String = row.get(1)?;
            let id = Uuid::parse_str(&guid).map_err(|e| conversion_error(1, e))?;
            Ok((
                row.get::<_, i64>(0)?,
                LedgerTransaction {
                    id,
                    origin: row.get(2)?,
                    date: date_column(row, 3)?,
                    currency: row.get(4)?,
                    description: row.get(5)?,
                    notes: row.get(6)?,
                    splits: Vec::new(),
                },
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut transactions = Vec::with_capacity(headers.len());
    for (rowid, mut tx) in headers {
        tx.splits = split_stmt
            .query_map([rowid], |row| {
                Ok(Split {
                    account: LedgerAccount {
                        path: path_column(row, 0)?,
                        commodity: row.get(1)?,
                    },
                    value: Cents(row.get(2)?),
                    amount: row.get::<_, Option<i64>>(3)?.map(Units),
                    action: action_from_str(row.get(4)?),
                    memo: row.get(5)?,
                    reconciled: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        transactions.push(tx);
    }

    Ok(transactions)
}

pub fn get_prices(conn: &Connection) -> Result<Vec<PriceObservation>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT account_path, commodity, currency, date, value_num, source, kind
         FROM prices ORDER BY id",
    )?;

    let prices = stmt
        .query_map([], |row| {
            Ok(PriceObservation {
                account: path_column(row, 0)?,
                commodity: row.get(1)?,
                currency: row.get(2)?,
                date: date_column(row, 3)?,
                value: row.get(4)?,
                source: row.get(5)?,
                kind: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(prices)
}

// ============================================================================
// SESSION
// ============================================================================

/// A ledger session over one outer SQLite transaction.
pub struct SqliteLedger<'c> {
    tx: rusqlite::Transaction<'c>,
}

impl<'c> SqliteLedger<'c> {
    pub fn begin(conn: &'c mut Connection) -> Result<Self, StoreError> {
        Ok(SqliteLedger {
            tx: conn.transaction()?,
        })
    }

    /// Commit in PROD, roll back otherwise.
    pub fn finish(self, mode: RunMode) -> Result<(), StoreError> {
        if mode.persists() {
            self.tx.commit()?;
            info!(%mode, "ledger session committed");
        } else {
            self.tx.rollback()?;
            info!(%mode, "ledger session rolled back");
        }
        Ok(())
    }
}

impl LedgerStore for SqliteLedger<'_> {
    fn find_account(&self, path: &AccountPath) -> Result<Option<LedgerAccount>, StoreError> {
        let commodity: Option<String> = self
            .tx
            .query_row(
                "SELECT commodity FROM accounts WHERE path = ?1",
                params![path.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(commodity.map(|commodity| LedgerAccount {
            path: path.clone(),
            commodity,
        }))
    }

    fn record_transaction(&mut self, tx: &LedgerTransaction) -> Result<bool, StoreError> {
        // Dropping the savepoint without commit rolls it back
        let sp = self.tx.savepoint()?;

        let inserted = sp.execute(
            "INSERT OR IGNORE INTO ledger_transactions (
                tx_guid, fingerprint, origin, date, currency, description, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                tx.id.to_string(),
                tx.fingerprint(),
                tx.origin,
                tx.date.format(DATE_FORMAT).to_string(),
                tx.currency,
                tx.description,
                tx.notes,
            ],
        )?;
        if inserted == 0 {
            debug!(id = %tx.id, "fingerprint already recorded");
            return Ok(false);
        }

        let rowid = sp.last_insert_rowid();
        for (position, split) in tx.splits.iter().enumerate() {
            sp.execute(
                "INSERT INTO splits (
                    transaction_id, position, account_path, commodity,
                    value_cents, amount_units, action, memo, reconciled
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    rowid,
                    position as i64,
                    split.account.path.to_string(),
                    split.account.commodity,
                    split.value.0,
                    split.amount.map(|u| u.0),
                    action_to_str(split.action),
                    split.memo,
                    split.reconciled,
                ],
            )?;
        }

        sp.commit()?;
        Ok(true)
    }

    fn record_price(&mut self, price: &PriceObservation) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO prices (
                account_path, commodity, currency, date, value_num, value_denom, source, kind
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                price.account.to_string(),
                price.commodity,
                price.currency,
                price.date.format(DATE_FORMAT).to_string(),
                price.value,
                PRICE_DENOM,
                price.source,
                price.kind,
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
