// crates/policy-vault-core/src/core/time.rs
// ============================================================================
// Module: Policy Vault Timestamps
// Description: Millisecond timestamps recorded on policy writes.
// Purpose: Keep persisted times as plain integers independent of the clock.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! [`Timestamp`] stores unix milliseconds. Wall-clock access goes through the
//! `Clock` interface; this type only carries values the runtime already read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Converts a date-time into a millisecond timestamp, saturating at the i64 range.
    #[must_use]
    pub fn from_datetime(value: OffsetDateTime) -> Self {
        let millis = value.unix_timestamp_nanos() / 1_000_000;
        Self(i64::try_from(millis).unwrap_or(if millis < 0 { i64::MIN } else { i64::MAX }))
    }

    /// Returns the unix milliseconds value.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }
}
