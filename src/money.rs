// 💵 Fixed-point money and unit quantities
//
// Money carries 2 implied decimals (cents), fund units carry 4
// (ten-thousandths). Both are exact signed integers: no floating point is
// ever involved in parsing, balancing or pricing.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Denominator of a money value (2 implied decimals)
pub const CENTS_PER_UNIT: i64 = 100;

/// Denominator of a unit quantity (4 implied decimals)
pub const UNIT_SCALE: i64 = 10_000;

// ============================================================================
// FIXED-POINT TYPES
// ============================================================================

/// Signed amount of money in cents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cents(pub i64);

/// Signed quantity of fund units in ten-thousandths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Units(pub i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Units {
    pub const ZERO: Units = Units(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl Add for Cents {
    type Output = Cents;

    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0 + rhs.0)
    }
}

impl Sub for Cents {
    type Output = Cents;

    fn sub(self, rhs: Cents) -> Cents {
        Cents(self.0 - rhs.0)
    }
}

impl Neg for Cents {
    type Output = Cents;

    fn neg(self) -> Cents {
        Cents(-self.0)
    }
}

impl Neg for Units {
    type Output = Units;

    fn neg(self) -> Units {
        Units(-self.0)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Cents>>(iter: I) -> Cents {
        iter.fold(Cents::ZERO, |acc, c| acc + c)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_units(*self))
    }
}

// ============================================================================
// PATTERNS
// ============================================================================

// `(` or `-` opens a negative amount; `)` may only close a `(`.
fn money_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<open>[(-])?\$(?P<whole>\d{1,6}(?:,\d{3})*)\.(?P<frac>\d{2})(?P<close>\))?$")
            .expect("money pattern is a valid regex")
    })
}

fn units_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<neg>-)?(?P<whole>\d{1,5})\.(?P<frac>\d{4})$")
            .expect("units pattern is a valid regex")
    })
}

struct MoneyParts<'a> {
    negative: bool,
    whole: &'a str,
    frac: &'a str,
}

fn split_money(text: &str) -> Result<MoneyParts<'_>, LedgerError> {
    let caps = money_pattern()
        .captures(text)
        .ok_or_else(|| LedgerError::malformed("gross", text))?;

    let open = caps.name("open").map(|m| m.as_str());
    let closed = caps.name("close").is_some();

    // a stray `)` or a `-$...)` mix is not one of the accepted shapes
    if closed && open != Some("(") {
        return Err(LedgerError::malformed("gross", text));
    }

    let (whole, frac) = match (caps.name("whole"), caps.name("frac")) {
        (Some(w), Some(f)) => (w.as_str(), f.as_str()),
        _ => return Err(LedgerError::malformed("gross", text)),
    };

    Ok(MoneyParts {
        negative: open.is_some(),
        whole,
        frac,
    })
}

// ============================================================================
// MONEY
// ============================================================================

/// Parse a statement money field into exact cents.
///
/// Accepted: `$1,234.56`, `($1,234.56)` and the copy-paste variant
/// `-$1,234.56`. Grouping commas are stripped.
pub fn parse_money(text: &str) -> Result<Cents, LedgerError> {
    let text = text.trim();
    let parts = split_money(text)?;

    let digits: String = parts
        .whole
        .chars()
        .filter(|c| *c != ',')
        .chain(parts.frac.chars())
        .collect();

    let magnitude: i64 = digits
        .parse()
        .map_err(|_| LedgerError::malformed("gross", text))?;

    Ok(if parts.negative {
        Cents(-magnitude)
    } else {
        Cents(magnitude)
    })
}

/// Render cents in statement style: `$1,234.56`, negatives in parentheses.
pub fn format_money(amount: Cents) -> String {
    let magnitude = amount.0.unsigned_abs();
    let scale = CENTS_PER_UNIT as u64;
    let whole = group_thousands(&(magnitude / scale).to_string());
    let body = format!("${}.{:02}", whole, magnitude % scale);

    if amount.is_negative() {
        format!("({})", body)
    } else {
        body
    }
}

/// Canonical textual form of a money field, computed on the text itself:
/// leading zeros dropped, commas regrouped, `-$x` rewritten as `($x)`.
pub fn normalize_money(text: &str) -> Result<String, LedgerError> {
    let text = text.trim();
    let parts = split_money(text)?;

    let bare: String = parts.whole.chars().filter(|c| *c != ',').collect();
    let trimmed = bare.trim_start_matches('0');
    let whole = if trimmed.is_empty() { "0" } else { trimmed };

    // negative zero is still zero
    let is_zero = whole == "0" && parts.frac == "00";

    let body = format!("${}.{}", group_thousands(whole), parts.frac);
    Ok(if parts.negative && !is_zero {
        format!("({})", body)
    } else {
        body
    })
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

// ============================================================================
// UNITS
// ============================================================================

/// Parse a units field (`-12345.6789`) into ten-thousandths, sign preserved.
pub fn parse_units(text: &str) -> Result<Units, LedgerError> {
    let text = text.trim();
    let caps = units_pattern()
        .captures(text)
        .ok_or_else(|| LedgerError::malformed("units", text))?;

    let (whole, frac) = match (caps.name("whole"), caps.name("frac")) {
        (Some(w), Some(f)) => (w.as_str(), f.as_str()),
        _ => return Err(LedgerError::malformed("units", text)),
    };

    let magnitude: i64 = format!("{}{}", whole, frac)
        .parse()
        .map_err(|_| LedgerError::malformed("units", text))?;

    Ok(if caps.name("neg").is_some() {
        Units(-magnitude)
    } else {
        Units(magnitude)
    })
}

pub fn format_units(units: Units) -> String {
    let magnitude = units.0.unsigned_abs();
    let sign = if units.is_negative() { "-" } else { "" };
    format!(
        "{}{}.{:04}",
        sign,
        magnitude / UNIT_SCALE as u64,
        magnitude % UNIT_SCALE as u64
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_money_positive() {
        assert_eq!(parse_money("$1,234.56").unwrap(), Cents(123456));
        assert_eq!(parse_money("$0.07").unwrap(), Cents(7));
        assert_eq!(parse_money("$500.00").unwrap(), Cents(50000));
        assert_eq!(parse_money("  $12.30 ").unwrap(), Cents(1230));
    }

    #[test]
    fn test_parse_money_negative_variants() {
        assert_eq!(parse_money("($1,234.56)").unwrap(), Cents(-123456));
        assert_eq!(parse_money("-$1,234.56").unwrap(), Cents(-123456));
        // OCR sometimes loses the closing parenthesis
        assert_eq!(parse_money("($1,234.56").unwrap(), Cents(-123456));
    }

    #[test]
    fn test_parse_money_large_grouped() {
        assert_eq!(parse_money("$1,234,567.89").unwrap(), Cents(123456789));
    }

    #[test]
    fn test_parse_money_rejects_malformed() {
        for bad in [
            "", "1234.56", "$1234.5", "$12.345", "$1,23.45", "$1234567.00",
            "$12.34)", "-$12.34)", "$abc.00", "USD 12.00",
        ] {
            let err = parse_money(bad).unwrap_err();
            assert!(
                matches!(err, LedgerError::MalformedField { ref field, .. } if field == "gross"),
                "expected MalformedField for {:?}, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(Cents(123456)), "$1,234.56");
        assert_eq!(format_money(Cents(-123456)), "($1,234.56)");
        assert_eq!(format_money(Cents(5)), "$0.05");
        assert_eq!(format_money(Cents(100000000)), "$1,000,000.00");
    }

    #[test]
    fn test_money_round_trip_matches_normalized_text() {
        for text in [
            "$1,234.56",
            "($1,234.56)",
            "-$1,234.56",
            "$0001,234.56",
            "$1234.56",
            "$123456.00",
            "$0.00",
            "-$0.00",
            "($0.01",
            "$999,999,999.99",
        ] {
            let cents = parse_money(text).unwrap();
            assert_eq!(
                format_money(cents),
                normalize_money(text).unwrap(),
                "round trip failed for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("100.0000").unwrap(), Units(1_000_000));
        assert_eq!(parse_units("-100.0000").unwrap(), Units(-1_000_000));
        assert_eq!(parse_units("3.3330").unwrap(), Units(33330));
        assert_eq!(parse_units("0.0001").unwrap(), Units(1));
    }

    #[test]
    fn test_parse_units_rejects_malformed() {
        for bad in ["100.00", "123456.0000", "1,000.0000", "+1.0000", "abc", ""] {
            assert!(
                matches!(parse_units(bad), Err(LedgerError::MalformedField { .. })),
                "expected failure for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(Units(-1_000_000)), "-100.0000");
        assert_eq!(format_units(Units(33330)), "3.3330");
        assert_eq!(Units(7).to_string(), "0.0007");
    }

    #[test]
    fn test_cents_sum() {
        let total: Cents = vec![Cents(50000), Cents(-50000), Cents(3)].into_iter().sum();
        assert_eq!(total, Cents(3));
        assert_eq!(-Cents(12), Cents(-12));
    }
}
