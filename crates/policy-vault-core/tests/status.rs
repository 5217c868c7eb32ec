// crates/policy-vault-core/tests/status.rs
// ============================================================================
// Module: Status Derivation Tests
// Description: Table and property tests for lifecycle status derivation.
// Purpose: Pin rule ordering and the year-boundary behavior.
// ============================================================================

//! Status derivation tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use policy_vault_core::PolicyStatus;
use policy_vault_core::derive_status;
use policy_vault_core::parse_date;
use proptest::prelude::*;
use time::Date;
use time::Duration;

fn date(raw: &str) -> Date {
    parse_date(raw).expect("valid test date")
}

#[test]
fn status_table_for_mid_june() {
    let today = date("2024-06-15");
    let cases = [
        ("2024-01-01", "2024-06-20", PolicyStatus::Vencendo),
        ("2024-01-01", "2024-05-20", PolicyStatus::Vencida),
        ("2024-01-01", "2024-05-01", PolicyStatus::NaoRenovada),
        ("2023-01-01", "2023-12-31", PolicyStatus::NaoRenovada),
        ("2024-01-01", "2025-01-01", PolicyStatus::Vigente),
    ];
    for (start, end, expected) in cases {
        assert_eq!(derive_status(date(start), date(end), today), expected, "end {end}");
    }
}

#[test]
fn prior_year_start_with_past_end_is_not_renewed() {
    let today = date("2024-06-15");
    let status = derive_status(date("2023-06-10"), date("2024-06-10"), today);
    assert_eq!(status, PolicyStatus::NaoRenovada);
}

#[test]
fn expiring_window_is_inclusive_at_thirty_days() {
    let today = date("2024-06-15");
    let start = date("2024-01-01");
    assert_eq!(derive_status(start, date("2024-07-15"), today), PolicyStatus::Vencendo);
    assert_eq!(derive_status(start, date("2024-07-16"), today), PolicyStatus::Vigente);
    assert_eq!(derive_status(start, date("2024-06-15"), today), PolicyStatus::Vencendo);
}

#[test]
fn grace_window_ends_after_thirty_days() {
    let today = date("2024-06-15");
    let start = date("2024-01-01");
    assert_eq!(derive_status(start, today - Duration::days(1), today), PolicyStatus::Vencida);
    assert_eq!(derive_status(start, today - Duration::days(30), today), PolicyStatus::Vencida);
    assert_eq!(derive_status(start, today - Duration::days(31), today), PolicyStatus::NaoRenovada);
    assert_eq!(derive_status(start, today - Duration::days(45), today), PolicyStatus::NaoRenovada);
}

#[test]
fn status_labels_round_trip_through_strings() {
    for status in [
        PolicyStatus::Vigente,
        PolicyStatus::Vencendo,
        PolicyStatus::Vencida,
        PolicyStatus::NaoRenovada,
    ] {
        assert_eq!(status.as_str().parse::<PolicyStatus>().unwrap(), status);
    }
    assert!("expired".parse::<PolicyStatus>().is_err());
}

proptest! {
    #[test]
    fn end_in_prior_year_is_always_not_renewed(
        start_offset in 0_i64 .. 3_000,
        today_offset in 0_i64 .. 365,
    ) {
        let today = date("2025-01-01") + Duration::days(today_offset);
        let end = date("2024-12-31");
        let start = end - Duration::days(start_offset + 1);
        prop_assert_eq!(derive_status(start, end, today), PolicyStatus::NaoRenovada);
    }

    #[test]
    fn far_future_end_is_vigente(days_ahead in 31_i64 .. 200) {
        let today = date("2024-03-01");
        let start = date("2024-01-01");
        let end = today + Duration::days(days_ahead);
        prop_assert_eq!(derive_status(start, end, today), PolicyStatus::Vigente);
    }
}
