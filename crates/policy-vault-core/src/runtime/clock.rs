// crates/policy-vault-core/src/runtime/clock.rs
// ============================================================================
// Module: Policy Vault Clocks
// Description: System and fixed clock implementations.
// Purpose: Make "now" injectable for status derivation and timestamps.
// Dependencies: crate::interfaces, time
// ============================================================================

//! ## Overview
//! [`SystemClock`] reads UTC wall time. [`FixedClock`] returns a settable
//! instant and is what tests use to pin status derivation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use time::Date;
use time::Duration;
use time::OffsetDateTime;

use crate::interfaces::Clock;

// ============================================================================
// SECTION: System Clock
// ============================================================================

/// UTC wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

// ============================================================================
// SECTION: Fixed Clock
// ============================================================================

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    /// Current instant.
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    /// Creates a clock pinned to `now`.
    #[must_use]
    pub const fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Creates a clock pinned to UTC midnight of `date`.
    #[must_use]
    pub const fn at_date(date: Date) -> Self {
        Self::new(date.midnight().assume_utc())
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: OffsetDateTime) {
        match self.now.lock() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    /// Advances the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let next = self.now() + delta;
        self.set(next);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
