// 🔄 Batch Orchestrator - one forward pass over every plan type
//
//   for each plan type:
//       resolve plan accounts once
//       for each record, in arrival order:
//           parse → resolve fund → normalize → (switch? match or defer)
//                 → build + validate → prices → commit decision
//   leftover switch legs → UnmatchedSwitch warnings
//
// Record-level errors become that record's outcome and the pass continues.
// Store errors end the run; the caller's outer session is then rolled back.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::accounts::{AccountResolver, PlanAccounts, PlanType};
use crate::batch::BatchInput;
use crate::builder::{commit_transaction, Disposition, DoubleEntryBuilder, LedgerTransaction};
use crate::config::{AccountChart, EngineConfig, RunMode};
use crate::db::SqliteLedger;
use crate::error::{LedgerError, PipelineError, StoreError};
use crate::parser::{parse_fields, FieldNormalizer, RawTransaction};
use crate::pricing::{prices_for, PriceObservation};
use crate::reconciliation::{MatchOutcome, PendingSwitchIndex};
use crate::store::LedgerStore;

// ============================================================================
// OUTCOMES & REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// PROD: the transaction built from this record was written
    Committed { id: Uuid },

    /// PROD: an identical transaction was already in the ledger
    AlreadyRecorded { id: Uuid },

    /// TEST: built and validated, then discarded
    Validated { id: Uuid },

    /// Switch leg still waiting for its counter-leg
    Deferred,

    /// Switch leg consumed by a later record, which carries the transaction
    Paired { with: usize },

    Failed { error: LedgerError },
}

impl Outcome {
    fn from_disposition(disposition: Disposition, id: Uuid) -> Self {
        match disposition {
            Disposition::Committed => Outcome::Committed { id },
            Disposition::AlreadyRecorded => Outcome::AlreadyRecorded { id },
            Disposition::DryRun => Outcome::Validated { id },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordOutcome {
    pub plan: PlanType,
    pub seq: usize,
    pub description: String,
    pub trade_date: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanCounts {
    pub records: usize,
    pub transactions: usize,
    pub committed: usize,
    pub failed: usize,
    pub unmatched: usize,
}

/// Per-run summary exposed as data for the surrounding tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub owner: String,
    pub source: String,
    pub date: String,
    pub mode: RunMode,
    pub plans: BTreeMap<PlanType, PlanCounts>,
}

impl BatchSummary {
    pub fn total(&self) -> PlanCounts {
        self.plans.values().fold(PlanCounts::default(), |acc, c| PlanCounts {
            records: acc.records + c.records,
            transactions: acc.transactions + c.transactions,
            committed: acc.committed + c.committed,
            failed: acc.failed + c.failed,
            unmatched: acc.unmatched + c.unmatched,
        })
    }

    pub fn summary(&self) -> String {
        let total = self.total();
        format!(
            "[{}] {} ({}): {} records → {} transactions, {} committed, {} failed, {} unmatched switches",
            self.mode,
            self.source,
            self.owner,
            total.records,
            total.transactions,
            total.committed,
            total.failed,
            total.unmatched
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub outcomes: Vec<RecordOutcome>,
    pub transactions: Vec<LedgerTransaction>,
    pub prices: Vec<PriceObservation>,
    pub price_errors: Vec<LedgerError>,
    pub warnings: Vec<LedgerError>,
}

impl BatchReport {
    pub fn outcome(&self, plan: PlanType, seq: usize) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.plan == plan && o.seq == seq)
            .map(|o| &o.outcome)
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

enum Step {
    Deferred,
    Single(LedgerTransaction),

    /// The matcher consumed the `earlier` leg; `built` is the attempt to
    /// turn the pair into a transaction
    Switch {
        earlier: Option<usize>,
        built: Result<LedgerTransaction, LedgerError>,
    },
}

/// (plan, seq) -> position in `BatchReport::outcomes`
type Positions = BTreeMap<(PlanType, usize), usize>;

pub struct BatchOrchestrator {
    config: EngineConfig,
    chart: AccountChart,
}

impl BatchOrchestrator {
    pub fn new(config: EngineConfig, chart: AccountChart) -> Self {
        BatchOrchestrator { config, chart }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one batch against a store. Only a store error returns `Err`.
    pub fn run<S: LedgerStore + ?Sized>(
        &self,
        batch: &BatchInput,
        store: &mut S,
    ) -> Result<BatchReport, StoreError> {
        let resolver = AccountResolver::new(&self.chart);
        let normalizer = FieldNormalizer::new(&self.chart);
        let builder = DoubleEntryBuilder::new(&self.config, &self.chart.fee_marker)
            .with_source(&batch.source);
        let mut index = PendingSwitchIndex::new(self.config.match_trade_year);

        let mut report = self.empty_report(batch);
        let mut positions = Positions::new();

        info!(
            mode = %self.config.mode,
            source = %batch.source,
            records = batch.record_count(),
            "starting batch"
        );

        for (&plan, records) in &batch.plans {
            let counts = report.summary.plans.entry(plan).or_default();
            counts.records = records.len();

            let plan_accounts = match resolver.plan_accounts(&*store, plan, batch.owner()) {
                Ok(accounts) => Some(accounts),
                Err(PipelineError::Session(e)) => return Err(e),
                Err(PipelineError::Record(e)) => {
                    warn!(%plan, error = %e, "cannot resolve plan accounts, skipping plan");
                    for (seq, raw) in records.iter().enumerate() {
                        positions.insert((plan, seq), report.outcomes.len());
                        report.outcomes.push(record_outcome(
                            plan,
                            seq,
                            raw,
                            Outcome::Failed { error: e.clone() },
                        ));
                    }
                    counts.failed = records.len();
                    None
                }
            };
            let Some(plan_accounts) = plan_accounts else {
                continue;
            };

            for (seq, raw) in records.iter().enumerate() {
                let step = self.process_record(
                    &*store,
                    &resolver,
                    &normalizer,
                    &builder,
                    &mut index,
                    &plan_accounts,
                    seq,
                    raw,
                );

                let outcome =
                    self.settle_step(plan, seq, step, &positions, &mut *store, &mut report)?;

                let counts = report.summary.plans.entry(plan).or_default();
                match &outcome {
                    Outcome::Failed { .. } => counts.failed += 1,
                    Outcome::Committed { .. } => {
                        counts.transactions += 1;
                        counts.committed += 1;
                    }
                    Outcome::AlreadyRecorded { .. } | Outcome::Validated { .. } => {
                        counts.transactions += 1
                    }
                    Outcome::Deferred | Outcome::Paired { .. } => {}
                }

                positions.insert((plan, seq), report.outcomes.len());
                report.outcomes.push(record_outcome(plan, seq, raw, outcome));
            }
        }

        for leg in index.drain_unmatched() {
            let warning = LedgerError::UnmatchedSwitch {
                plan: leg.plan.to_string(),
                description: leg.description.clone(),
            };
            warn!(plan = %leg.plan, seq = leg.seq, "{}", warning);
            report.summary.plans.entry(leg.plan).or_default().unmatched += 1;
            report.warnings.push(warning);
        }

        info!("{}", report.summary.summary());
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn process_record<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        resolver: &AccountResolver<'_>,
        normalizer: &FieldNormalizer<'_>,
        builder: &DoubleEntryBuilder<'_>,
        index: &mut PendingSwitchIndex,
        plan_accounts: &PlanAccounts,
        seq: usize,
        raw: &RawTransaction,
    ) -> Result<Step, PipelineError> {
        let fields = parse_fields(raw)?;
        let fund = resolver.fund_accounts(store, plan_accounts, &raw.fund_company, &raw.fund_code)?;
        let record = normalizer.normalize(raw, plan_accounts.plan, seq, fields, fund)?;

        if let Some(revenue) = &record.revenue_account {
            return Ok(Step::Single(builder.build_single(&record, revenue)?));
        }

        match index.offer(record) {
            MatchOutcome::Deferred => Ok(Step::Deferred),
            MatchOutcome::Paired(pair) => {
                let earlier = pair
                    .legs()
                    .into_iter()
                    .map(|leg| leg.seq)
                    .find(|&leg_seq| leg_seq != seq);
                Ok(Step::Switch {
                    earlier,
                    built: builder.build_switch(&pair),
                })
            }
        }
    }

    /// Turn one record's step into its outcome. A consumed switch leg is
    /// marked `Paired` before the pair is settled, so a pair that fails to
    /// build fails on the arriving record only.
    fn settle_step<S: LedgerStore + ?Sized>(
        &self,
        plan: PlanType,
        seq: usize,
        step: Result<Step, PipelineError>,
        positions: &Positions,
        store: &mut S,
        report: &mut BatchReport,
    ) -> Result<Outcome, StoreError> {
        let built = match step {
            Err(PipelineError::Session(e)) => return Err(e),
            Err(PipelineError::Record(error)) => Err(error),
            Ok(Step::Deferred) => return Ok(Outcome::Deferred),
            Ok(Step::Single(tx)) => Ok(tx),
            Ok(Step::Switch { earlier, built }) => {
                if let Some(&pos) = earlier.and_then(|e| positions.get(&(plan, e))) {
                    report.outcomes[pos].outcome = Outcome::Paired { with: seq };
                }
                built
            }
        };

        match built {
            Ok(tx) => self.finish_transaction(tx, store, report),
            Err(error) => {
                warn!(%plan, seq, error = %error, "record failed");
                Ok(Outcome::Failed { error })
            }
        }
    }

    fn empty_report(&self, batch: &BatchInput) -> BatchReport {
        BatchReport {
            summary: BatchSummary {
                owner: batch.owner.clone(),
                source: batch.source.clone(),
                date: batch.date.clone(),
                mode: self.config.mode,
                plans: BTreeMap::new(),
            },
            outcomes: Vec::with_capacity(batch.record_count()),
            transactions: Vec::new(),
            prices: Vec::new(),
            price_errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Prices, then the commit decision. Prices are only stored alongside a
    /// transaction that was actually written.
    fn finish_transaction<S: LedgerStore + ?Sized>(
        &self,
        tx: LedgerTransaction,
        store: &mut S,
        report: &mut BatchReport,
    ) -> Result<Outcome, StoreError> {
        let (prices, price_errors) = prices_for(&tx, &self.config);
        let disposition = commit_transaction(&tx, self.config.mode, store)?;

        if disposition == Disposition::Committed {
            for price in &prices {
                store.record_price(price)?;
            }
        }

        let outcome = Outcome::from_disposition(disposition, tx.id);
        report.prices.extend(prices);
        report.price_errors.extend(price_errors);
        report.transactions.push(tx);
        Ok(outcome)
    }
}

fn record_outcome(plan: PlanType, seq: usize, raw: &RawTransaction, outcome: Outcome) -> RecordOutcome {
    RecordOutcome {
        plan,
        seq,
        description: raw.description.trim().to_string(),
        trade_date: raw.trade_date.trim().to_string(),
        outcome,
    }
}

/// Run a batch inside one SQLite session: committed in PROD, rolled back
/// otherwise, and always rolled back when the run fails.
pub fn import_batch(
    conn: &mut Connection,
    batch: &BatchInput,
    orchestrator: &BatchOrchestrator,
) -> Result<BatchReport, StoreError> {
    let mut ledger = SqliteLedger::begin(conn)?;
    let report = orchestrator.run(batch, &mut ledger)?;
    ledger.finish(orchestrator.config().mode)?;
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================
