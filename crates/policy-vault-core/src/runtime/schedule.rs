// crates/policy-vault-core/src/runtime/schedule.rs
// ============================================================================
// Module: Policy Vault Installment Schedules
// Description: Synthesis of monthly installment schedules.
// Purpose: Fill in installments when a candidate carries only a monthly amount.
// Dependencies: crate::core, time
// ============================================================================

//! ## Overview
//! Installment `k` (1-based) is due `start + (k - 1)` months with the day
//! clamped to the end of the month, carries the monthly amount, and starts as
//! `upcoming`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::Date;

use crate::core::InstallmentItem;
use crate::core::InstallmentStatus;
use crate::core::Money;
use crate::core::add_months;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default number of synthesized installments.
pub const DEFAULT_INSTALLMENT_COUNT: u32 = 12;
/// Maximum number of installments in one schedule.
pub const MAX_INSTALLMENT_COUNT: u32 = 120;

// ============================================================================
// SECTION: Synthesis
// ============================================================================

/// Synthesizes `count` monthly installments starting at `start`.
///
/// Returns an empty schedule for a zero amount or zero count.
#[must_use]
pub fn synthesize_installments(monthly: Money, start: Date, count: u32) -> Vec<InstallmentItem> {
    if monthly.is_zero() {
        return Vec::new();
    }
    (1 ..= count.min(MAX_INSTALLMENT_COUNT))
        .map(|sequence| InstallmentItem {
            sequence,
            amount: monthly,
            due_date: add_months(start, sequence - 1),
            status: InstallmentStatus::Upcoming,
        })
        .collect()
}
