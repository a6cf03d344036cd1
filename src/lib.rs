// Fund Ledger - Core Library
// Investment statement records → balanced double-entry ledger transactions

pub mod error;
pub mod money;
pub mod config;
pub mod accounts;
pub mod store;
pub mod parser;          // Field Normalizer
pub mod reconciliation;  // Switch-Pair Matcher
pub mod builder;         // Double-Entry Builder
pub mod pricing;         // Price Observation Builder
pub mod pipeline;        // Batch Orchestrator
pub mod db;              // SQLite ledger store
pub mod batch;           // Batch input loaders

// Re-export commonly used types
pub use error::{LedgerError, PipelineError, StoreError};
pub use money::{
    Cents, Units,
    parse_money, format_money, normalize_money, parse_units, format_units,
};
pub use config::{AccountChart, EngineConfig, RunMode};
pub use accounts::{
    AccountCategory, AccountPath, AccountResolver, FundAccounts, PlanAccounts, PlanType,
};
pub use store::{LedgerAccount, LedgerStore, MemoryLedger};
pub use parser::{
    FieldNormalizer, NormalizedTransaction, ParsedFields, RawTransaction,
    is_switch, parse_fields, parse_trade_date,
};
pub use reconciliation::{MatchOutcome, PendingSwitchIndex, SwitchPair};
pub use builder::{
    Disposition, DoubleEntryBuilder, LedgerTransaction, Split, SplitAction,
    commit_transaction,
};
pub use pricing::{PriceObservation, derive_price, nav_value, prices_for, PRICE_DENOM};
pub use pipeline::{
    BatchOrchestrator, BatchReport, BatchSummary, Outcome, PlanCounts, RecordOutcome,
    import_batch,
};
pub use db::{
    SqliteLedger,
    setup_ledger, open_account, load_accounts_csv,
    count_transactions, get_transactions, get_prices,
};
pub use batch::{BatchInput, load_batch, load_batch_csv, load_batch_json};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
