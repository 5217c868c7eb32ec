// crates/policy-vault-core/src/core/status.rs
// ============================================================================
// Module: Policy Vault Status Derivation
// Description: Lifecycle status as a pure function of vigency dates and today.
// Purpose: Keep status deterministic and recomputed on every ingestion.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Rules are evaluated in order, with `diff = days_between(now, end)`:
//! 1. end year before the current year: `nao_renovada`
//! 2. start year before the current year and `diff < 0`: `nao_renovada`
//! 3. `diff < -30`: `nao_renovada`
//! 4. `diff < 0`: `vencida`
//! 5. `diff <= 30`: `vencendo`
//! 6. otherwise `vigente`

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use time::Date;

use crate::core::dates::days_between;

// ============================================================================
// SECTION: Policy Status
// ============================================================================

/// Lifecycle status of a policy record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    /// In force.
    Vigente,
    /// Expiring within 30 days.
    Vencendo,
    /// Expired within the last 30 days.
    Vencida,
    /// Expired and not renewed.
    NaoRenovada,
}

impl PolicyStatus {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vigente => "vigente",
            Self::Vencendo => "vencendo",
            Self::Vencida => "vencida",
            Self::NaoRenovada => "nao_renovada",
        }
    }
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "vigente" => Ok(Self::Vigente),
            "vencendo" => Ok(Self::Vencendo),
            "vencida" => Ok(Self::Vencida),
            "nao_renovada" => Ok(Self::NaoRenovada),
            other => Err(format!("unknown policy status: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Derivation
// ============================================================================

/// Days before the end date during which a policy is `vencendo`.
const EXPIRING_WINDOW_DAYS: i64 = 30;
/// Days after the end date during which a policy is `vencida`.
const GRACE_WINDOW_DAYS: i64 = 30;

/// Derives the lifecycle status for the given vigency dates on `today`.
#[must_use]
pub fn derive_status(start: Date, end: Date, today: Date) -> PolicyStatus {
    let diff_days = days_between(today, end);
    if end.year() < today.year() {
        return PolicyStatus::NaoRenovada;
    }
    if start.year() < today.year() && diff_days < 0 {
        return PolicyStatus::NaoRenovada;
    }
    if diff_days < -GRACE_WINDOW_DAYS {
        return PolicyStatus::NaoRenovada;
    }
    if diff_days < 0 {
        return PolicyStatus::Vencida;
    }
    if diff_days <= EXPIRING_WINDOW_DAYS {
        return PolicyStatus::Vencendo;
    }
    PolicyStatus::Vigente
}
