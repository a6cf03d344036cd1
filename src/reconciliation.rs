// ⚖️ Switch-Pair Matcher - reconcile the two legs of a fund switch
//
// A switch shows up on the statement as two separate lines: value leaving
// one fund and the same value entering another. Neither line can be booked
// alone. The first leg to arrive waits in the pending list of its plan type
// until a counter-leg arrives:
//
//   same fund company, gross exactly negated, same trade day and month
//
// The earliest waiting leg that qualifies is consumed; the arriving leg is
// never stored. Anything still waiting when the batch ends is unmatched.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::accounts::PlanType;
use crate::parser::NormalizedTransaction;

// ============================================================================
// PAIR
// ============================================================================

/// Two reconciled switch legs, ordered by direction rather than arrival:
/// `outgoing` is the leg whose gross is negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchPair {
    pub outgoing: NormalizedTransaction,
    pub incoming: NormalizedTransaction,
}

impl SwitchPair {
    /// Order two legs. With a zero gross on both sides there is no
    /// direction, so arrival order is kept.
    pub fn new(earlier: NormalizedTransaction, later: NormalizedTransaction) -> Self {
        if later.gross.is_negative() && !earlier.gross.is_negative() {
            SwitchPair {
                outgoing: later,
                incoming: earlier,
            }
        } else {
            SwitchPair {
                outgoing: earlier,
                incoming: later,
            }
        }
    }

    pub fn legs(&self) -> [&NormalizedTransaction; 2] {
        [&self.outgoing, &self.incoming]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// The counter-leg was waiting; both legs are ready to book
    Paired(SwitchPair),

    /// No counter-leg yet; the leg now waits in the pending list
    Deferred,
}

// ============================================================================
// PENDING INDEX
// ============================================================================

#[derive(Debug, Default)]
pub struct PendingSwitchIndex {
    pending: BTreeMap<PlanType, Vec<NormalizedTransaction>>,

    /// Also compare trade years (stricter than the statements require)
    match_trade_year: bool,
}

impl PendingSwitchIndex {
    pub fn new(match_trade_year: bool) -> Self {
        PendingSwitchIndex {
            pending: BTreeMap::new(),
            match_trade_year,
        }
    }

    fn is_counter_leg(&self, waiting: &NormalizedTransaction, arriving: &NormalizedTransaction) -> bool {
        waiting.is_switch
            && waiting.fund_company == arriving.fund_company
            && waiting.gross == -arriving.gross
            && waiting.trade_day() == arriving.trade_day()
            && waiting.trade_month() == arriving.trade_month()
            && (!self.match_trade_year || waiting.trade_year() == arriving.trade_year())
    }

    /// Offer a switch leg. Either consumes its earliest waiting counter-leg
    /// or stores the leg until one arrives.
    pub fn offer(&mut self, arriving: NormalizedTransaction) -> MatchOutcome {
        let plan = arriving.plan;

        let position = self.pending.get(&plan).and_then(|waiting| {
            waiting
                .iter()
                .position(|candidate| self.is_counter_leg(candidate, &arriving))
        });

        match position {
            Some(index) => {
                let waiting = self.pending.entry(plan).or_default();
                let earlier = waiting.remove(index);
                if waiting.is_empty() {
                    self.pending.remove(&plan);
                }
                debug!(%plan, earlier = earlier.seq, later = arriving.seq, "matched switch pair");
                MatchOutcome::Paired(SwitchPair::new(earlier, arriving))
            }
            None => {
                debug!(%plan, seq = arriving.seq, "switch leg waiting for its counter-leg");
                self.pending.entry(plan).or_default().push(arriving);
                MatchOutcome::Deferred
            }
        }
    }

    pub fn pending(&self, plan: PlanType) -> &[NormalizedTransaction] {
        self.pending.get(&plan).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every leg still waiting, by plan type then arrival order.
    pub fn drain_unmatched(&mut self) -> Vec<NormalizedTransaction> {
        std::mem::take(&mut self.pending)
            .into_values()
            .flatten()
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountPath;
    use crate::money::{Cents, Units};
    use crate::store::LedgerAccount;
    use chrono::NaiveDate;

    fn leg(seq: usize, company: &str, code: &str, gross: i64, units: i64, date: (i32, u32, u32)) -> NormalizedTransaction {
        let name = format!("{} {}", company, code);
        NormalizedTransaction {
            seq,
            plan: PlanType::Open,
            trade_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            gross: Cents(gross),
            units: Units(units),
            is_switch: true,
            fund_company: company.to_string(),
            description: format!("Switch {}", name),
            notes: name.clone(),
            asset_account: LedgerAccount {
                path: AccountPath::new(&["FAMILY", "INVEST", "OPEN", &name]),
                commodity: name.replace(' ', "_"),
            },
            revenue_account: None,
        }
    }

    #[test]
    fn test_first_leg_is_deferred() {
        let mut index = PendingSwitchIndex::new(false);
        let outcome = index.offer(leg(0, "MFC", "856", -50000, -1_000_000, (2019, 3, 15)));
        assert_eq!(outcome, MatchOutcome::Deferred);
        assert_eq!(index.pending(PlanType::Open).len(), 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_counter_leg_pairs_and_consumes() {
        let mut index = PendingSwitchIndex::new(false);
        index.offer(leg(0, "MFC", "856", -50000, -1_000_000, (2019, 3, 15)));
        let outcome = index.offer(leg(1, "MFC", "6130", 50000, 1_000_000, (2019, 3, 15)));

        match outcome {
            MatchOutcome::Paired(pair) => {
                assert_eq!(pair.outgoing.seq, 0);
                assert_eq!(pair.incoming.seq, 1);
            }
            MatchOutcome::Deferred => panic!("expected a pair"),
        }
        assert!(index.is_empty());
    }

    #[test]
    fn test_pair_order_does_not_depend_on_arrival() {
        let out_leg = leg(0, "MFC", "856", -50000, -1_000_000, (2019, 3, 15));
        let in_leg = leg(1, "MFC", "6130", 50000, 1_000_000, (2019, 3, 15));

        let a = SwitchPair::new(out_leg.clone(), in_leg.clone());
        let b = SwitchPair::new(in_leg, out_leg);
        assert_eq!(a, b);
    }

    #[test]
    fn test_predicates_must_all_hold() {
        let mut index = PendingSwitchIndex::new(false);
        index.offer(leg(0, "MFC", "856", -50000, -1_000_000, (2019, 3, 15)));

        // other company
        assert_eq!(index.offer(leg(1, "TML", "704", 50000, 1, (2019, 3, 15))), MatchOutcome::Deferred);
        // same sign, not negated
        assert_eq!(index.offer(leg(2, "MFC", "6130", -50000, 1, (2019, 3, 15))), MatchOutcome::Deferred);
        // different day
        assert_eq!(index.offer(leg(3, "MFC", "6130", 50000, 1, (2019, 3, 16))), MatchOutcome::Deferred);
        // different month
        assert_eq!(index.offer(leg(4, "MFC", "6130", 50000, 1, (2019, 4, 15))), MatchOutcome::Deferred);

        assert_eq!(index.len(), 5);
    }

    #[test]
    fn test_year_is_ignored_unless_strict() {
        let mut lenient = PendingSwitchIndex::new(false);
        lenient.offer(leg(0, "MFC", "856", -100, -1, (2018, 12, 31)));
        assert!(matches!(
            lenient.offer(leg(1, "MFC", "6130", 100, 1, (2019, 12, 31))),
            MatchOutcome::Paired(_)
        ));

        let mut strict = PendingSwitchIndex::new(true);
        strict.offer(leg(0, "MFC", "856", -100, -1, (2018, 12, 31)));
        assert_eq!(
            strict.offer(leg(1, "MFC", "6130", 100, 1, (2019, 12, 31))),
            MatchOutcome::Deferred
        );
    }

    #[test]
    fn test_earliest_candidate_wins() {
        let mut index = PendingSwitchIndex::new(false);
        index.offer(leg(0, "MFC", "856", -50000, -1, (2019, 3, 15)));
        index.offer(leg(1, "MFC", "298", -50000, -2, (2019, 3, 15)));

        match index.offer(leg(2, "MFC", "6130", 50000, 3, (2019, 3, 15))) {
            MatchOutcome::Paired(pair) => assert_eq!(pair.outgoing.seq, 0),
            MatchOutcome::Deferred => panic!("expected a pair"),
        }
        assert_eq!(index.pending(PlanType::Open)[0].seq, 1);
    }

    #[test]
    fn test_plan_types_are_separate() {
        let mut index = PendingSwitchIndex::new(false);
        index.offer(leg(0, "MFC", "856", -50000, -1, (2019, 3, 15)));

        let mut other_plan = leg(1, "MFC", "6130", 50000, 1, (2019, 3, 15));
        other_plan.plan = PlanType::Tfsa;
        assert_eq!(index.offer(other_plan), MatchOutcome::Deferred);

        let unmatched = index.drain_unmatched();
        assert_eq!(unmatched.len(), 2);
        assert_eq!(unmatched[0].plan, PlanType::Open);
        assert_eq!(unmatched[1].plan, PlanType::Tfsa);
        assert!(index.is_empty());
    }
}
