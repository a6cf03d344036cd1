use anyhow::{Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fund_ledger::{
    count_transactions, get_prices, get_transactions, import_batch, load_accounts_csv,
    load_batch, open_account, setup_ledger, AccountChart, BatchOrchestrator, EngineConfig,
    RunMode,
};

/// Path of an optional account chart JSON; the built-in chart is used otherwise
const CHART_ENV: &str = "FUND_LEDGER_CHART";

const USAGE: &str = "usage:
  fund-ledger import <batch.json|batch.csv> <ledger.db> <test|prod> [owner]
  fund-ledger init <ledger.db> <accounts.csv>
  fund-ledger show <ledger.db>";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("import") if args.len() >= 5 => {
            run_import(&args[2], &args[3], &args[4], args.get(5).map(String::as_str))
        }
        Some("init") if args.len() >= 4 => run_init(&args[2], &args[3]),
        Some("show") if args.len() >= 3 => run_show(&args[2]),
        _ => {
            eprintln!("❌ Not enough parameters!");
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }
}

fn load_chart() -> Result<AccountChart> {
    match env::var(CHART_ENV) {
        Ok(path) => AccountChart::from_file(&path),
        Err(_) => Ok(AccountChart::default()),
    }
}

fn open_ledger(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open ledger {}", db_path))?;
    setup_ledger(&conn).context("Failed to set up ledger schema")?;
    Ok(conn)
}

fn run_import(batch_path: &str, db_path: &str, mode: &str, owner: Option<&str>) -> Result<()> {
    let mode: RunMode = mode.parse()?;
    let batch_path = Path::new(batch_path);
    if !batch_path.is_file() {
        anyhow::bail!("Batch file '{}' does not exist", batch_path.display());
    }

    let batch = load_batch(batch_path, owner)?;
    let chart = load_chart()?;
    let mut conn = open_ledger(db_path)?;

    let orchestrator = BatchOrchestrator::new(EngineConfig::new(mode), chart);
    let report = import_batch(&mut conn, &batch, &orchestrator)
        .context("Import aborted, ledger session rolled back")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    info!("✅ {}", report.summary.summary());
    Ok(())
}

fn run_init(db_path: &str, accounts_path: &str) -> Result<()> {
    let accounts = load_accounts_csv(Path::new(accounts_path))?;
    let conn = open_ledger(db_path)?;

    let mut created = 0;
    for account in &accounts {
        if open_account(&conn, &account.path, &account.commodity)? {
            created += 1;
        }
    }

    info!(
        created,
        existing = accounts.len() - created,
        "✓ Ledger accounts ready"
    );
    Ok(())
}

fn run_show(db_path: &str) -> Result<()> {
    let conn = open_ledger(db_path)?;

    let count = count_transactions(&conn)?;
    println!("📊 {} transactions", count);
    for tx in get_transactions(&conn)? {
        println!("{}  {}", tx.date, tx.description);
        for split in &tx.splits {
            let amount = split
                .amount
                .map(|units| units.to_string())
                .unwrap_or_default();
            println!(
                "    {:<60} {:>12} {:>14}",
                split.account.path.to_string(),
                fund_ledger::format_money(split.value),
                amount
            );
        }
    }

    let prices = get_prices(&conn)?;
    println!("\n💹 {} prices", prices.len());
    for price in prices {
        println!(
            "{}  {:<12} {} {}",
            price.date,
            price.commodity,
            price.display_value(),
            price.currency
        );
    }

    Ok(())
}
