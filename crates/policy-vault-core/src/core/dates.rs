// crates/policy-vault-core/src/core/dates.rs
// ============================================================================
// Module: Policy Vault Calendar Dates
// Description: Date parsing, month arithmetic, and ISO serde helpers.
// Purpose: Accept the date shapes found in policy documents and store ISO dates.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Accepted input forms:
//! - ISO `YYYY-MM-DD`
//! - RFC 3339 date-times (the calendar date as written is kept)
//! - day-first `DD/MM/YYYY`, `DD-MM-YYYY`, `DD.MM.YYYY`; two-digit years map to 20YY
//!
//! Dates persist as `YYYY-MM-DD` strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Deserializer;
use serde::Serializer;
use time::Date;
use time::Month;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses a date in any accepted input form.
#[must_use]
pub fn parse_date(raw: &str) -> Option<Date> {
    let value = raw.trim();
    if value.len() == 10 && is_iso_shape(value) {
        return parse_iso_date(value);
    }
    if let Some(prefix) = value.get(.. 10)
        && value.len() > 10
        && is_iso_shape(prefix)
    {
        OffsetDateTime::parse(value, &Rfc3339).ok()?;
        return parse_iso_date(prefix);
    }
    parse_day_first(value)
}

/// Returns true when the input looks like `dddd-dd-dd`.
fn is_iso_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes.iter().enumerate().all(|(idx, b)| idx == 4 || idx == 7 || b.is_ascii_digit())
}

/// Parses a strict `YYYY-MM-DD` date.
fn parse_iso_date(value: &str) -> Option<Date> {
    let mut parts = value.split('-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u8>().ok()?;
    let day = parts.next()?.parse::<u8>().ok()?;
    build_date(year, month, day)
}

/// Parses day-first dates separated by `/`, `-`, or `.`.
fn parse_day_first(value: &str) -> Option<Date> {
    let separator = value.chars().find(|ch| matches!(ch, '/' | '-' | '.'))?;
    let parts: Vec<&str> = value.split(separator).collect();
    let [day, month, year] = parts.as_slice() else {
        return None;
    };
    let numeric = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if ![*day, *month, *year].into_iter().all(numeric) {
        return None;
    }
    if day.len() > 2 || month.len() > 2 {
        return None;
    }
    let day = day.parse::<u8>().ok()?;
    let month = month.parse::<u8>().ok()?;
    let year = match year.len() {
        2 => 2000 + year.parse::<i32>().ok()?,
        4 => year.parse::<i32>().ok()?,
        _ => return None,
    };
    build_date(year, month, day)
}

/// Builds a calendar date from numeric parts.
fn build_date(year: i32, month: u8, day: u8) -> Option<Date> {
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

// ============================================================================
// SECTION: Arithmetic
// ============================================================================

/// Adds calendar months, clamping the day to the end of the target month.
#[must_use]
pub fn add_months(date: Date, months: u32) -> Date {
    let month_index = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1;
    let target = month_index + i64::from(months);
    let Ok(year) = i32::try_from(target.div_euclid(12)) else {
        return date;
    };
    let Ok(month_number) = u8::try_from(target.rem_euclid(12) + 1) else {
        return date;
    };
    let Ok(month) = Month::try_from(month_number) else {
        return date;
    };
    let mut day = date.day();
    loop {
        if let Ok(result) = Date::from_calendar_date(year, month, day) {
            return result;
        }
        if day <= 28 {
            return date;
        }
        day -= 1;
    }
}

/// Returns the signed number of calendar days from `from` to `to`.
#[must_use]
pub fn days_between(from: Date, to: Date) -> i64 {
    (to - from).whole_days()
}

// ============================================================================
// SECTION: Formatting
// ============================================================================

/// Formats a date as `YYYY-MM-DD`.
#[must_use]
pub fn format_iso_date(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

/// Serde adapter storing a [`Date`] as `YYYY-MM-DD`.
pub mod iso_date {
    use super::Date;
    use super::Deserialize;
    use super::Deserializer;
    use super::Serializer;
    use super::format_iso_date;
    use super::parse_iso_date;

    /// Serializes a date as an ISO string.
    ///
    /// # Errors
    ///
    /// Returns the serializer error unchanged.
    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_iso_date(*date))
    }

    /// Deserializes a date from an ISO string.
    ///
    /// # Errors
    ///
    /// Returns an error when the string is not a valid `YYYY-MM-DD` date.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_iso_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {raw}")))
    }
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

    fn date(year: i32, month: u8, day: u8) -> Date {
        build_date(year, month, day).unwrap()
    }

    #[test]
    fn accepts_every_input_form() {
        let expected = date(2024, 3, 5);
        let forms = [
            "2024-03-05",
            "2024-03-05T10:00:00Z",
            "05/03/2024",
            "05-03-2024",
            "05.03.2024",
            "5/3/24",
        ];
        for raw in forms {
            assert_eq!(parse_date(raw), Some(expected), "input {raw}");
        }
    }

    #[test]
    fn rfc3339_keeps_written_calendar_date() {
        assert_eq!(parse_date("2024-01-10T23:30:00-03:00"), Some(date(2024, 1, 10)));
    }

    #[test]
    fn rejects_impossible_and_mixed_forms() {
        assert_eq!(parse_date("31/02/2024"), None);
        assert_eq!(parse_date("05/03-2024"), None);
        assert_eq!(parse_date("2024-13-01"), None);
        assert_eq!(parse_date("soon"), None);
    }

    #[test]
    fn add_months_clamps_to_month_end() {
        assert_eq!(add_months(date(2024, 1, 31), 1), date(2024, 2, 29));
        assert_eq!(add_months(date(2023, 1, 31), 1), date(2023, 2, 28));
        assert_eq!(add_months(date(2024, 1, 10), 11), date(2024, 12, 10));
        assert_eq!(add_months(date(2024, 11, 30), 3), date(2025, 2, 28));
    }

    #[test]
    fn days_between_is_signed() {
        assert_eq!(days_between(date(2024, 6, 15), date(2024, 6, 20)), 5);
        assert_eq!(days_between(date(2024, 6, 15), date(2024, 5, 1)), -45);
    }
}
