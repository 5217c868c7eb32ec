// crates/policy-vault-core/src/core/money.rs
// ============================================================================
// Module: Policy Vault Money
// Description: Fixed two-decimal currency amounts and locale-tolerant parsing.
// Purpose: Store premiums and installments exactly, without float drift.
// Dependencies: bigdecimal, serde, thiserror
// ============================================================================

//! ## Overview
//! [`Money`] stores integer cents. Parsing goes through [`BigDecimal`] and
//! rounds half-up to two decimal places.
//!
//! [`Money::parse_locale`] accepts amounts as they appear in extracted
//! documents: currency symbols and spaces are stripped, and the decimal
//! separator is inferred. When both `,` and `.` appear, the later one is the
//! decimal separator. A single `,` or `.` is the decimal separator; repeated
//! identical separators are thousands separators.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use bigdecimal::RoundingMode;
use bigdecimal::ToPrimitive;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when parsing canonical money strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Input is not a decimal number.
    #[error("invalid amount: {0}")]
    Invalid(String),
    /// Amount does not fit the cents range.
    #[error("amount out of range: {0}")]
    OutOfRange(String),
}

// ============================================================================
// SECTION: Money
// ============================================================================

/// Currency amount with exactly two decimal places.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money {
    /// Amount in cents.
    cents: i64,
}

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self { cents: 0 };

    /// Creates an amount from cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns the amount in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.cents
    }

    /// Returns true when the amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.cents == 0
    }

    /// Rounds a decimal half-up to cents.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::OutOfRange`] when the amount does not fit in i64 cents.
    pub fn from_decimal(value: &BigDecimal) -> Result<Self, MoneyError> {
        let rounded = value.with_scale_round(2, RoundingMode::HalfUp);
        let cents = (rounded * BigDecimal::from(100))
            .to_i64()
            .ok_or_else(|| MoneyError::OutOfRange(value.to_string()))?;
        Ok(Self { cents })
    }

    /// Parses a JSON number (any precision, exponent allowed) into cents.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError`] when the number cannot be represented.
    pub fn from_json_number(number: &serde_json::Number) -> Result<Self, MoneyError> {
        let raw = number.to_string();
        let decimal = BigDecimal::from_str(&raw).map_err(|_| MoneyError::Invalid(raw.clone()))?;
        Self::from_decimal(&decimal)
    }

    /// Parses a locale-formatted amount such as `R$ 1.234,56` or `1,234.56`.
    ///
    /// Returns `None` when no amount can be recovered from the input.
    #[must_use]
    pub fn parse_locale(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let negative = trimmed.starts_with('-');
        let kept: String =
            trimmed.chars().filter(|ch| ch.is_ascii_digit() || *ch == ',' || *ch == '.').collect();
        if !kept.chars().any(|ch| ch.is_ascii_digit()) {
            return None;
        }
        let canonical = canonical_decimal(&kept)?;
        let signed = if negative { format!("-{canonical}") } else { canonical };
        let decimal = BigDecimal::from_str(&signed).ok()?;
        Self::from_decimal(&decimal).ok()
    }

    /// Multiplies the amount by an integer factor in wide arithmetic.
    #[must_use]
    pub fn times_wide(self, factor: i64) -> i128 {
        i128::from(self.cents) * i128::from(factor)
    }
}

/// Rewrites a digits-and-separators string into `digits[.digits]`.
fn canonical_decimal(kept: &str) -> Option<String> {
    let last_comma = kept.rfind(',');
    let last_dot = kept.rfind('.');
    let decimal_sep = match (last_comma, last_dot) {
        (Some(comma), Some(dot)) => Some(if comma > dot { ',' } else { '.' }),
        (Some(_), None) => single_separator(kept, ','),
        (None, Some(_)) => single_separator(kept, '.'),
        (None, None) => None,
    };
    let mut out = String::with_capacity(kept.len() + 1);
    let mut seen_decimal = false;
    for ch in kept.chars() {
        if ch.is_ascii_digit() {
            out.push(ch);
        } else if Some(ch) == decimal_sep {
            if seen_decimal {
                return None;
            }
            seen_decimal = true;
            out.push('.');
        }
    }
    if out.starts_with('.') {
        out.insert(0, '0');
    }
    if out.ends_with('.') {
        out.push('0');
    }
    Some(out)
}

/// Returns the separator when it occurs once, or `None` when it repeats.
fn single_separator(kept: &str, sep: char) -> Option<char> {
    (kept.matches(sep).count() == 1).then_some(sep)
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let decimal =
            BigDecimal::from_str(raw.trim()).map_err(|_| MoneyError::Invalid(raw.to_string()))?;
        Self::from_decimal(&decimal)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Coherence
// ============================================================================

/// Returns true when `monthly * 12` is within `tolerance_percent` of `premium`.
///
/// A zero premium or zero monthly amount is always coherent.
#[must_use]
pub fn premium_is_coherent(premium: Money, monthly: Money, tolerance_percent: u8) -> bool {
    if premium.is_zero() || monthly.is_zero() {
        return true;
    }
    let expected = monthly.times_wide(12);
    let actual = i128::from(premium.cents());
    let deviation = (expected - actual).abs();
    deviation * 100 <= actual.abs() * i128::from(tolerance_percent)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn later_separator_is_decimal() {
        assert_eq!(Money::parse_locale("1.234,56"), Some(Money::from_cents(123_456)));
        assert_eq!(Money::parse_locale("1,234.56"), Some(Money::from_cents(123_456)));
    }

    #[test]
    fn lone_comma_is_decimal_and_repeated_separators_are_thousands() {
        assert_eq!(Money::parse_locale("350,5"), Some(Money::from_cents(35_050)));
        assert_eq!(Money::parse_locale("1.234.567"), Some(Money::from_cents(123_456_700)));
        assert_eq!(Money::parse_locale("1,234,567"), Some(Money::from_cents(123_456_700)));
    }

    #[test]
    fn currency_symbols_are_stripped_and_sign_kept() {
        assert_eq!(Money::parse_locale("R$ 4.200,00"), Some(Money::from_cents(420_000)));
        assert_eq!(Money::parse_locale("-12,30"), Some(Money::from_cents(-1_230)));
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(Money::parse_locale("10,005"), Some(Money::from_cents(1_001)));
        assert_eq!("2.675".parse::<Money>().unwrap(), Money::from_cents(268));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(Money::parse_locale("n/a"), None);
        assert_eq!(Money::parse_locale(""), None);
        assert_eq!(Money::parse_locale("1.234,56,78"), None);
    }

    #[test]
    fn display_pads_cents() {
        assert_eq!(Money::from_cents(35_000).to_string(), "350.00");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
    }

    #[test]
    fn coherence_respects_tolerance() {
        let premium = Money::from_cents(420_000);
        assert!(premium_is_coherent(premium, Money::from_cents(35_000), 15));
        assert!(!premium_is_coherent(premium, Money::from_cents(50_000), 15));
        assert!(premium_is_coherent(Money::ZERO, Money::from_cents(50_000), 15));
    }
}
