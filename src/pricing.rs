// 💹 Price Deriver - one NAV observation per asset leg
//
// A transaction carries its own unit price: gross / units. The ledger stores
// prices as a rational with a fixed denominator, so the value kept here is
// the number of 1/10000ths of a currency unit per fund unit:
//
//   value = trunc(gross_cents * 1_000_000 / units_tt)     denom = 10000
//
// (cents → 1/10000ths is *100, units_tt → units is *10000.)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::accounts::AccountPath;
use crate::builder::{LedgerTransaction, Split};
use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::money::{Cents, Units};

/// Denominator of every stored price value
pub const PRICE_DENOM: i64 = 10_000;

const PRICE_SCALE: i128 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Asset account the price was observed on
    pub account: AccountPath,

    /// Fund commodity being priced
    pub commodity: String,
    pub currency: String,
    pub date: NaiveDate,

    /// Numerator over PRICE_DENOM
    pub value: i64,
    pub source: String,
    pub kind: String,
}

impl PriceObservation {
    pub fn denom(&self) -> i64 {
        PRICE_DENOM
    }

    /// Price as a decimal string, e.g. `30.0000`
    pub fn display_value(&self) -> String {
        let sign = if self.value < 0 { "-" } else { "" };
        let abs = self.value.unsigned_abs();
        format!(
            "{}{}.{:04}",
            sign,
            abs / PRICE_DENOM as u64,
            abs % PRICE_DENOM as u64
        )
    }
}

/// Price numerator for a gross value and a unit count, truncated toward zero.
/// `None` when there are no units to divide by or the result overflows.
pub fn nav_value(gross: Cents, units: Units) -> Option<i64> {
    if units.is_zero() {
        return None;
    }
    let scaled = i128::from(gross.0) * PRICE_SCALE / i128::from(units.0);
    i64::try_from(scaled).ok()
}

/// Derive the price observation for one asset split.
pub fn derive_price(
    leg: &Split,
    date: NaiveDate,
    config: &EngineConfig,
) -> Result<PriceObservation, LedgerError> {
    let division_by_zero = || LedgerError::DivisionByZero {
        account: leg.account.path.to_string(),
    };

    let units = leg.amount.ok_or_else(division_by_zero)?;
    let value = nav_value(leg.value, units).ok_or_else(division_by_zero)?;

    debug!(account = %leg.account.path, value, "derived price");

    Ok(PriceObservation {
        account: leg.account.path.clone(),
        commodity: leg.account.commodity.clone(),
        currency: config.currency.clone(),
        date,
        value,
        source: config.price_source.clone(),
        kind: config.price_type.clone(),
    })
}

/// Derive a price for every asset leg of a transaction. A leg that cannot be
/// priced does not stop the others: its error is returned alongside.
pub fn prices_for(
    tx: &LedgerTransaction,
    config: &EngineConfig,
) -> (Vec<PriceObservation>, Vec<LedgerError>) {
    let mut prices = Vec::new();
    let mut errors = Vec::new();

    for leg in tx.asset_legs() {
        match derive_price(leg, tx.date, config) {
            Ok(price) => prices.push(price),
            Err(e) => {
                warn!(error = %e, "skipping price");
                errors.push(e);
            }
        }
    }

    (prices, errors)
}
